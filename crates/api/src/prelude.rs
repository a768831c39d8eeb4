//! Prelude module for convenient imports.

pub use crate::error::ApiError;
pub use crate::routes::create_router;
pub use crate::server::{ApiServer, ServerConfig};
pub use crate::state::AppState;
