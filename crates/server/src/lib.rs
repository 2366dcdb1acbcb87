// crates/server/src/lib.rs
//! Jobwatch server library.
//!
//! Axum HTTP server holding the authoritative job registry. Operation
//! triggers report progress over REST (or in-process through [`JobTracker`]),
//! observers list jobs and subscribe to a per-owner-scope SSE stream.

pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::*;
pub use jobs::{JobRegistry, JobTracker, ProgressBroadcaster};
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (jobs, resources, health) and `/metrics`
/// - CORS (allows any origin; browser observers run on another port)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use jobwatch_types::{Job, JobStatus, MutationResponse};
    use tower::ServiceExt;

    /// Helper to make a GET request to the app.
    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();

        (status, body_str)
    }

    /// Helper to POST a JSON body to the app.
    async fn post(app: Router, uri: &str, json: serde_json::Value) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    // ========================================================================
    // Health Endpoint Tests
    // ========================================================================

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_app(AppState::new());
        let (status, body) = get(app, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));
        assert!(body.contains("\"version\""));
        assert!(body.contains("\"uptimeSecs\""));
    }

    // ========================================================================
    // Job Lifecycle Tests
    // ========================================================================

    #[tokio::test]
    async fn test_progress_is_monotonic_over_http() {
        let app = create_app(AppState::new());
        let (status, _) = post(
            app.clone(),
            "/api/jobs",
            serde_json::json!({"id": "a1", "type": "analysis", "ownerScope": "c", "title": "Acme"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        post(
            app.clone(),
            "/api/jobs/a1/progress",
            serde_json::json!({"percentage": 60, "message": "Scoring", "step": 3, "stepStatus": "active"}),
        )
        .await;
        let (status, body) = post(
            app.clone(),
            "/api/jobs/a1/progress",
            serde_json::json!({"percentage": 40, "message": "late", "step": 2, "stepStatus": "active"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let response: MutationResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.job.progress_percentage, 60);
        assert_eq!(response.job.status_message, "Scoring");

        let (_, body) = get(app, "/api/jobs/a1").await;
        let job: Job = serde_json::from_str(&body).unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.progress_percentage, 60);
    }

    #[tokio::test]
    async fn test_first_terminal_wins_over_http() {
        let app = create_app(AppState::new());
        post(
            app.clone(),
            "/api/jobs",
            serde_json::json!({"id": "a1", "type": "analysis", "ownerScope": "c", "title": "Acme"}),
        )
        .await;

        let (_, body) = post(app.clone(), "/api/jobs/a1/complete", serde_json::json!({})).await;
        let first: MutationResponse = serde_json::from_str(&body).unwrap();
        assert!(first.applied);

        let (_, body) = post(
            app.clone(),
            "/api/jobs/a1/error",
            serde_json::json!({"message": "too late"}),
        )
        .await;
        let second: MutationResponse = serde_json::from_str(&body).unwrap();
        assert!(!second.applied);
        assert_eq!(second.job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_not_found_returns_json_error() {
        let app = create_app(AppState::new());
        let (status, body) = get(app, "/api/jobs/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("\"error\""));
    }
}
