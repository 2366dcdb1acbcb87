// crates/server/src/routes/jobs.rs
//! API routes for job tracking.
//!
//! Observer side:
//! - GET    /jobs?ownerScope=        — snapshot, newest first
//! - GET    /jobs/stream?ownerScope= — SSE push subscription
//! - GET    /jobs/{id}               — single job
//! - DELETE /jobs/{id}               — dismiss (always 204)
//!
//! Trigger side:
//! - POST /jobs                — register a job
//! - POST /jobs/{id}/progress  — progress report
//! - POST /jobs/{id}/complete  — mark completed
//! - POST /jobs/{id}/error     — mark failed

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use jobwatch_types::{
    CompleteRequest, ErrorRequest, Job, MutationResponse, NewJob, ProgressUpdate, RESYNC_EVENT,
};

use crate::error::{ApiError, ApiResult};
use crate::jobs::Mutation;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeQuery {
    owner_scope: Option<String>,
}

impl ScopeQuery {
    fn require(self) -> ApiResult<String> {
        self.owner_scope
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("ownerScope query parameter is required".into()))
    }
}

/// POST /api/jobs — Register a job.
async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = state.tracker.create(body)?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs?ownerScope= — List an owner scope's jobs, newest first.
async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let owner_scope = query.require()?;
    Ok(Json(state.registry().list(&owner_scope)))
}

/// GET /api/jobs/{id}
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .registry()
        .get(&id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// DELETE /api/jobs/{id} — Always 204; dismissing twice or racing a
/// completion is fine.
async fn delete_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    state.tracker.remove(&id);
    StatusCode::NO_CONTENT
}

/// POST /api/jobs/{id}/progress
async fn report_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ProgressUpdate>,
) -> ApiResult<Json<MutationResponse>> {
    let mutation = state.tracker.update_progress(&id, &body)?;
    Ok(Json(to_response(mutation)))
}

/// POST /api/jobs/{id}/complete
async fn report_complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<CompleteRequest>>,
) -> ApiResult<Json<MutationResponse>> {
    let resource_id = body.and_then(|Json(b)| b.resource_id);
    let mutation = state.tracker.mark_complete(&id, resource_id)?;
    Ok(Json(to_response(mutation)))
}

/// POST /api/jobs/{id}/error
async fn report_error(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ErrorRequest>,
) -> ApiResult<Json<MutationResponse>> {
    let mutation = state.tracker.mark_error(&id, &body.message)?;
    Ok(Json(to_response(mutation)))
}

fn to_response(mutation: Mutation) -> MutationResponse {
    MutationResponse {
        applied: mutation.applied(),
        job: mutation.into_job(),
    }
}

/// GET /api/jobs/stream?ownerScope= — SSE stream of an owner scope's job events.
///
/// | Event name | Data                                                   |
/// |------------|--------------------------------------------------------|
/// | `progress` | `{jobId, jobType, percentage, message, step, stepStatus}` |
/// | `complete` | `{jobId, jobType, resourceId?}`                        |
/// | `error`    | `{jobId, jobType, message}`                            |
/// | `resync`   | `{}` — events were missed, re-list                     |
///
/// No history is sent on connect; observers list the registry themselves.
async fn stream_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let owner_scope = query.require()?;
    let mut subscription = state.broadcaster().subscribe(&owner_scope);

    let stream = async_stream::stream! {
        loop {
            match subscription.recv().await {
                Ok(event) => match event.to_data() {
                    Ok(data) => yield Ok(Event::default().event(event.kind()).data(data)),
                    Err(e) => tracing::error!(error = %e, "failed to encode job event"),
                },
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(
                        owner_scope = %subscription.owner_scope(),
                        skipped = n,
                        "SSE client lagged, asking it to resync"
                    );
                    yield Ok(Event::default().event(RESYNC_EVENT).data("{}"));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/stream", get(stream_jobs))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
        .route("/jobs/{id}/progress", post(report_progress))
        .route("/jobs/{id}/complete", post(report_complete))
        .route("/jobs/{id}/error", post(report_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Arc<AppState>, Router) {
        let state = AppState::new();
        let app = Router::new().nest("/api", router()).with_state(state.clone());
        (state, app)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_router_creation() {
        let _router = router();
    }

    #[tokio::test]
    async fn test_list_requires_owner_scope() {
        let (_, app) = app();
        let (status, _) = send(app, "GET", "/api/jobs", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_jobs_empty() {
        let (_, app) = app();
        let (status, body) = send(app, "GET", "/api/jobs?ownerScope=client-1", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        assert!(json.is_empty());
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let (_, app) = app();
        let body = serde_json::json!({
            "id": "t1",
            "type": "transcription",
            "ownerScope": "client-1",
            "title": "Board call",
            "resourceId": "tr-1",
        });
        let (status, created) = send(app.clone(), "POST", "/api/jobs", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let job: Job = serde_json::from_str(&created).unwrap();
        assert_eq!(job.target_resource_id.as_deref(), Some("tr-1"));
        assert!(job.resource_id.is_none());

        let (status, _) = send(app, "POST", "/api/jobs", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_progress_for_unknown_job_is_404() {
        let (_, app) = app();
        let (status, _) = send(
            app,
            "POST",
            "/api/jobs/nope/progress",
            Some(serde_json::json!({"percentage": 10, "step": 1, "stepStatus": "active"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_204() {
        let (_, app) = app();
        let (status, _) = send(app, "DELETE", "/api/jobs/never-existed", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
