//! HTTP API handlers

mod agent_config;
mod extract;
mod health;
mod reconcile;
mod workspace;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Agent routes
        .route(
            "/agents/{agent_id}/workspaces_agent_config",
            get(agent_config::get_agent_config).put(agent_config::update_agent_config),
        )
        .route(
            "/agents/{agent_id}/workspaces",
            post(workspace::create_workspace),
        )
        .route("/agents/{agent_id}/reconcile", post(reconcile::reconcile))
        // Workspace routes
        .route("/workspaces/{id}", get(workspace::get_workspace))
        .route(
            "/workspaces/{id}/desired_state",
            post(workspace::update_desired_state),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::infra::sqlite::memory_pool;

    const DEVFILE: &str = r#"
schemaVersion: 2.2.0
components:
  - name: tooling
    container:
      image: registry.example.dev/tooling:1.0
"#;

    async fn router() -> Router {
        let state = AppState::new(Arc::new(Config::default()), memory_pool().await);
        create_router(state)
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let router = router().await;
        let (status, body) = send(&router, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_workspace_round_trip() {
        let router = router().await;

        let (status, config) = send(
            &router,
            Method::PUT,
            "/api/v1/agents/agent-1/workspaces_agent_config",
            Some(json!({ "dns_zone": "workspaces.example.dev" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(config["version"], 1);
        assert_eq!(config["max_active_hours_before_stop"], 36);

        let (status, workspace) = send(
            &router,
            Method::POST,
            "/api/v1/agents/agent-1/workspaces",
            Some(json!({ "user_id": "user-1", "devfile": DEVFILE })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(workspace["actual_state"], "creation_requested");
        assert_eq!(workspace["desired_config_generator_version"], 1);
        let id = workspace["id"].as_str().unwrap().to_string();

        let (status, response) = send(
            &router,
            Method::POST,
            "/api/v1/agents/agent-1/reconcile",
            Some(json!({ "update_type": "full", "workspace_agent_infos": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(response["message"].is_null());
        assert_eq!(
            response["payload"]["settings"]["full_reconciliation_interval_seconds"],
            3600
        );
        let infos = response["payload"]["workspace_rails_infos"].as_array().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0]["name"], workspace["name"]);
        assert!(infos[0]["config_to_apply"].as_str().unwrap().starts_with("---\n"));
        assert!(infos[0]["deployment_resource_version"].is_null());

        let (status, stored) =
            send(&router, Method::GET, &format!("/api/v1/workspaces/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(stored["responded_to_agent_at"].is_string());

        let uri = format!("/api/v1/workspaces/{}/desired_state", id);
        let (status, updated) = send(
            &router,
            Method::POST,
            &uri,
            Some(json!({ "desired_state": "terminated" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["desired_state"], "terminated");

        let (status, error) = send(
            &router,
            Method::POST,
            &uri,
            Some(json!({ "desired_state": "running" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["code"], 2002);
    }

    #[tokio::test]
    async fn test_errors_map_to_status() {
        let router = router().await;

        let (status, error) =
            send(&router, Method::GET, "/api/v1/workspaces/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["code"], 2001);

        let (status, _) = send(
            &router,
            Method::GET,
            "/api/v1/agents/agent-1/workspaces_agent_config",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, error) = send(
            &router,
            Method::PUT,
            "/api/v1/agents/agent-1/workspaces_agent_config",
            Some(json!({
                "dns_zone": "workspaces.example.dev",
                "max_active_hours_before_stop": 8000,
                "max_stopped_hours_before_termination": 8000
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["code"], 3002);
    }

    #[tokio::test]
    async fn test_reconcile_reports_orphans_without_failing() {
        let router = router().await;

        let (status, response) = send(
            &router,
            Method::POST,
            "/api/v1/agents/agent-1/reconcile",
            Some(json!({
                "update_type": "partial",
                "workspace_agent_infos": [{
                    "name": "workspace-gone",
                    "namespace": "rd-ns-gone",
                    "current_actual_state": "running",
                    "workspace_exists": true,
                    "resource_version": "3"
                }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(response["payload"]["workspace_rails_infos"]
            .as_array()
            .unwrap()
            .is_empty());
        assert_eq!(
            response["payload"]["settings"]["partial_reconciliation_interval_seconds"],
            10
        );
    }

    #[tokio::test]
    async fn test_malformed_reconcile_body_is_rejected() {
        let router = router().await;
        let (status, error) = send(
            &router,
            Method::POST,
            "/api/v1/agents/agent-1/reconcile",
            Some(json!({ "update_type": "sideways" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["code"], 1002);
        assert!(error["message"].as_str().unwrap().contains("update_type"));
    }

    #[tokio::test]
    async fn test_unparseable_bodies_answer_with_error_body() {
        let router = router().await;

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/api/v1/agents/agent-1/workspaces_agent_config")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(error["code"], 1002);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/agents/agent-1/workspaces")
            .body(Body::from(json!({ "user_id": "user-1" }).to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(error["code"], 1002);
    }
}
