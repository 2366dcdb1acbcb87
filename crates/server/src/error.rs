// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::jobs::RegistryError;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Duplicate job id: {0}")]
    DuplicateId(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateId(id) => ApiError::DuplicateId(id),
            RegistryError::NotFound(id) => ApiError::JobNotFound(id),
            RegistryError::InvalidJob(_) | RegistryError::InvalidUpdate(_) => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::ResourceNotFound(id) => {
                tracing::warn!(resource_id = %id, "Resource not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details(
                        "Resource not found",
                        format!("Resource ID: {}", id),
                    ),
                )
            }
            ApiError::DuplicateId(id) => {
                tracing::warn!(job_id = %id, "Duplicate job id");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("DuplicateId", format!("Job ID: {}", id)),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
