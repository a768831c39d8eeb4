//! Persistence and HTTP collaborators for LP Cruise.
//!
//! This crate provides:
//! - Postgres storage of agent snapshots
//! - JSON-file storage of agent snapshots for single-host deployments
//! - HTTP clients for the recommendation service and the LP gateway

/// JSON-file state store.
pub mod file_store;
/// HTTP collaborator clients.
pub mod providers;
/// Postgres repositories.
pub mod repositories;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::file_store::JsonFileStateStore;
    pub use crate::providers::{HttpLpGateway, HttpRecommendationClient, HttpSettings};
    pub use crate::repositories::{Database, PgAgentStateRepository};
}
