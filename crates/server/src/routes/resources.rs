// crates/server/src/routes/resources.rs
//! Resource status endpoints, derived from the job registry.
//!
//! - GET /resources/{type}/{resourceId}/status — what the fallback poller reads
//! - GET /resources/{type}/{resourceId}        — the finished resource

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use jobwatch_types::{Job, JobStatus, JobType, ResourceDocument, ResourceStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn resource_status(job: &Job) -> ResourceStatus {
    match job.status {
        JobStatus::Pending | JobStatus::InProgress => ResourceStatus {
            in_progress: true,
            error: false,
            error_message: None,
        },
        JobStatus::Completed => ResourceStatus {
            in_progress: false,
            error: false,
            error_message: None,
        },
        JobStatus::Error => ResourceStatus {
            in_progress: false,
            error: true,
            error_message: Some(job.status_message.clone()).filter(|m| !m.is_empty()),
        },
    }
}

/// GET /api/resources/{type}/{resourceId}/status
async fn get_resource_status(
    State(state): State<Arc<AppState>>,
    Path((resource_type, resource_id)): Path<(JobType, String)>,
) -> ApiResult<Json<ResourceStatus>> {
    let job = state
        .registry()
        .find_by_resource(resource_type, &resource_id)
        .ok_or(ApiError::ResourceNotFound(resource_id))?;
    Ok(Json(resource_status(&job)))
}

/// GET /api/resources/{type}/{resourceId} — 404 until the producing job has
/// completed.
async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path((resource_type, resource_id)): Path<(JobType, String)>,
) -> ApiResult<Json<ResourceDocument>> {
    let job = state
        .registry()
        .find_by_resource(resource_type, &resource_id)
        .filter(|job| job.status == JobStatus::Completed)
        .ok_or_else(|| ApiError::ResourceNotFound(resource_id.clone()))?;

    Ok(Json(ResourceDocument {
        resource_type,
        resource_id: job.resource_key().to_string(),
        job_id: job.id,
        title: job.title,
        completed_at: job.updated_at,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/resources/{resource_type}/{resource_id}", get(get_resource))
        .route(
            "/resources/{resource_type}/{resource_id}/status",
            get(get_resource_status),
        )
}
