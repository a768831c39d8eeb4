//! REST API server and endpoints.
//!
//! This crate exposes a running orchestrator over HTTP:
//! - Service and agent status
//! - Run metrics, overall and per agent
//! - On-demand health checks and optimizations
//!
//! Handlers only forward to the orchestrator; every rule lives in
//! `cruise-execution`.

/// Prelude module for convenient imports.
pub mod prelude;

/// Error types.
pub mod error;
/// Request handlers.
pub mod handlers;
/// Route definitions.
pub mod routes;
/// Server configuration and startup.
pub mod server;
/// Application state.
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use server::{ApiServer, ServerConfig};
pub use state::AppState;
