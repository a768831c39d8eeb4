//! Risk assessment and remediation.
//!
//! Provides:
//! - Pluggable health scoring of an agent's funds
//! - Debounced escalation windows feeding the lifecycle state machine
//! - Periodic per-agent assessment timers
//! - Emergency exit and partial reduction through the executor

mod controller;
mod escalation;
mod scorer;

pub use controller::*;
pub use escalation::*;
pub use scorer::*;
