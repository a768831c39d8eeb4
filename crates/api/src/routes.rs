//! Route definitions.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};

/// Builds the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/metrics", get(handlers::get_metrics))
        .route("/metrics/{agent_id}", get(handlers::get_agent_metrics))
        .route(
            "/agents/{agent_id}/health-check",
            post(handlers::run_health_check),
        )
        .route("/agents/{agent_id}/optimize", post(handlers::run_optimize))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use cruise_domain::prelude::*;
    use cruise_execution::cruise::{
        CruisePorts, CruiseService, CruiseSettings, RecommendationOptimizer,
    };
    use cruise_execution::testkit::{InMemoryStateStore, MockChain, StaticRecommendations};
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> (Router, Arc<StaticRecommendations>) {
        let chain = Arc::new(MockChain::new());
        chain.set_balance("wallet-1", dec!(0)).await;
        let recs = Arc::new(StaticRecommendations::default());
        let ports = CruisePorts {
            wallet: chain.clone(),
            positions: chain.clone(),
            builder: chain.clone(),
            signer: chain.clone(),
            sender: chain.clone(),
            recommendations: recs.clone(),
            optimizer: Arc::new(RecommendationOptimizer::default()),
            store: Arc::new(InMemoryStateStore::new()),
            metrics: None,
            scorer: None,
        };
        let service = CruiseService::new(ports, CruiseSettings::default());
        let registered = service
            .register_agent("agent", AgentConfig::new("agent", "wallet-1"))
            .await;
        assert!(registered.success, "{}", registered.message);
        (create_router(AppState::new(service)), recs)
    }

    async fn call(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_lists_agents() {
        let (router, _) = app().await;
        let (status, body) = call(&router, Method::GET, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agents"][0]["agent_id"], "agent");
    }

    #[tokio::test]
    async fn test_health_check_then_metrics() {
        let (router, _) = app().await;

        let (status, body) = call(&router, Method::POST, "/agents/agent/health-check").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        // Registration runs the first check.
        let (status, body) = call(&router, Method::GET, "/metrics/agent").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["health_checks"], 2);

        let (status, body) = call(&router, Method::GET, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_health_checks"], 2);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_404() {
        let (router, _) = app().await;
        for (method, uri) in [
            (Method::POST, "/agents/ghost/health-check"),
            (Method::POST, "/agents/ghost/optimize"),
            (Method::GET, "/metrics/ghost"),
        ] {
            let (status, body) = call(&router, method, uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn test_collaborator_outage_is_502() {
        let (router, recs) = app().await;
        recs.set_fail(true);

        let (status, body) = call(&router, Method::POST, "/agents/agent/optimize").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["message"].as_str().unwrap().contains("503"));
    }
}
