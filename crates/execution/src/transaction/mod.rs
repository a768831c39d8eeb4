//! Transaction execution with retry and backoff.
//!
//! Provides:
//! - A request table keyed by request id
//! - Build, sign, send and confirm through the chain ports
//! - A backoff ladder between attempts, cancellable while waiting

mod executor;

pub use executor::*;
