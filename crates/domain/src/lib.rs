//! Domain model for LP agent orchestration.
//!
//! Plain data types shared by the engine and its adapters:
//! - Agent configuration and persisted status
//! - Funds, positions and ledger entries
//! - Risk assessments and thresholds
//! - Transaction requests, payloads and results
//! - Pool recommendations and optimization actions
//!
//! The lifecycle and request transition tables live here as pure functions
//! so they can be checked without any runtime.

pub mod entities;
pub mod enums;
pub mod error;
pub mod value_objects;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::entities::*;
    pub use crate::enums::*;
    pub use crate::error::{CruiseError, ErrorKind};
    pub use crate::value_objects::{OperationResult, Returns};
}
