//! Orchestration engine for LP agents.
//!
//! This crate provides the runtime that keeps agents healthy:
//! - Tag-addressable scheduling of recurring agent tasks
//! - Funds caching, transaction limits and a bounded ledger
//! - Transaction execution with retry and backoff
//! - The agent lifecycle state machine with persisted snapshots
//! - Periodic risk assessment with debounced escalation
//! - The orchestrator wiring all of the above per agent
//!
//! Everything chain-, storage- or service-facing goes through [`ports`].

/// Prelude module for convenient imports.
pub mod prelude;

/// Agent orchestration.
pub mod cruise;
/// Funds bookkeeping and limits.
pub mod funds;
/// Agent lifecycle state machine.
pub mod lifecycle;
/// In-process metrics.
pub mod metrics;
/// Collaborator traits.
pub mod ports;
/// Risk assessment and remediation.
pub mod risk;
/// Scheduler for agent task timing.
pub mod scheduler;
/// Transaction execution.
pub mod transaction;

/// In-memory port doubles.
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
