//! Request handlers.
//!
//! Each handler forwards to the orchestrator and maps a failed
//! [`OperationResult`] onto an [`ApiError`].

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use cruise_domain::prelude::OperationResult;
use cruise_execution::cruise::ServiceStatus;
use cruise_execution::metrics::{AgentMetrics, MetricsSnapshot};
use tracing::info;

fn respond(result: OperationResult) -> Result<Json<OperationResult>, ApiError> {
    if result.success {
        Ok(Json(result))
    } else {
        Err(result.into())
    }
}

/// `GET /status`
pub async fn get_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.service.status().await)
}

/// `GET /metrics`
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.service.metrics())
}

/// `GET /metrics/{agent_id}`
pub async fn get_agent_metrics(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentMetrics>, ApiError> {
    if !state.service.is_registered(&agent_id).await {
        return Err(ApiError::NotFound(format!("agent {agent_id} is not registered")));
    }
    Ok(Json(
        state.service.agent_metrics(&agent_id).unwrap_or_default(),
    ))
}

/// `POST /agents/{agent_id}/health-check`
pub async fn run_health_check(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<OperationResult>, ApiError> {
    info!(agent_id = %agent_id, "Health check requested over API");
    respond(state.service.health_check(&agent_id).await)
}

/// `POST /agents/{agent_id}/optimize`
pub async fn run_optimize(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<OperationResult>, ApiError> {
    info!(agent_id = %agent_id, "Optimization requested over API");
    respond(state.service.optimize(&agent_id).await)
}
