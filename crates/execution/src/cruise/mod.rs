//! Agent orchestration.
//!
//! Ties the engine together per agent:
//! - Registration and recurring task wiring
//! - Health checks with automatic position fill
//! - Market change checks and plan-driven optimization
//! - Funds safety alert handling

mod config;
mod optimizer;
mod service;

pub use config::*;
pub use optimizer::*;
pub use service::*;
