//! Application state shared by the handlers.

use cruise_execution::cruise::CruiseService;
use std::sync::Arc;

/// Handle on the running orchestrator.
#[derive(Clone)]
pub struct AppState {
    /// The orchestrator every route forwards to.
    pub service: Arc<CruiseService>,
}

impl AppState {
    /// Creates state around an orchestrator.
    #[must_use]
    pub fn new(service: Arc<CruiseService>) -> Self {
        Self { service }
    }
}
