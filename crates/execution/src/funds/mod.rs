//! Funds bookkeeping and transaction limits.
//!
//! Provides per-agent:
//! - Cached balance and position snapshots with a freshness window
//! - Single-transaction and daily volume caps
//! - A bounded transaction ledger and return calculation
//! - Safety alerts when the balance drops below the emergency reserve

mod manager;

pub use manager::*;
