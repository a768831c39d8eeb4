//! Agent lifecycle state machine.
//!
//! Tracks the lifecycle of each agent:
//! - Event-driven transitions over the domain transition table
//! - Funds-driven pauses and resumes
//! - Snapshot persistence on every change
//! - Transition fan-out to subscribers

mod events;
mod machine;

pub use events::*;
pub use machine::*;
