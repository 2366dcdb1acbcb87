//! API route handlers for the jobwatch server.

pub mod health;
pub mod jobs;
pub mod metrics;
pub mod resources;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health - Health check
/// - POST   /api/jobs - Register a job
/// - GET    /api/jobs?ownerScope= - List an owner scope's jobs
/// - GET    /api/jobs/stream?ownerScope= - SSE push subscription
/// - GET    /api/jobs/{id} - Get a job
/// - DELETE /api/jobs/{id} - Dismiss a job
/// - POST   /api/jobs/{id}/progress - Report progress
/// - POST   /api/jobs/{id}/complete - Mark completed
/// - POST   /api/jobs/{id}/error - Mark failed
/// - GET    /api/resources/{type}/{id}/status - Resource status for pollers
/// - GET    /api/resources/{type}/{id} - Finished resource document
/// - GET    /metrics - Prometheus metrics (no /api prefix)
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", resources::router())
        .merge(metrics::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_routes_creation() {
        let state = AppState::new();
        let _router = api_routes(state);
    }
}
