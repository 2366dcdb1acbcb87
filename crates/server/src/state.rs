// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use crate::jobs::{JobRegistry, JobTracker, ProgressBroadcaster, DEFAULT_CHANNEL_CAPACITY};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Registry + broadcaster facade used by trigger routes and in-process triggers.
    pub tracker: JobTracker,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new() -> Arc<Self> {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create with a specific per-scope push channel capacity.
    pub fn with_channel_capacity(capacity: usize) -> Arc<Self> {
        Self::with_tracker(JobTracker::new(
            Arc::new(JobRegistry::new()),
            Arc::new(ProgressBroadcaster::new(capacity)),
        ))
    }

    /// Create around an externally owned tracker (embedding and tests).
    pub fn with_tracker(tracker: JobTracker) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            tracker,
        })
    }

    pub fn registry(&self) -> &JobRegistry {
        self.tracker.registry()
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        self.tracker.broadcaster()
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_app_state_new() {
        let state = AppState::new();
        assert!(state.uptime_secs() < 1);
        assert!(state.registry().is_empty());
    }

    #[test]
    fn test_app_state_uptime() {
        let state = AppState::new();
        sleep(Duration::from_millis(100));
        assert!(state.uptime_secs() < 5);
    }

    #[test]
    fn test_shared_tracker_sees_same_registry() {
        let tracker = JobTracker::new(
            Arc::new(JobRegistry::new()),
            Arc::new(ProgressBroadcaster::default()),
        );
        let state = AppState::with_tracker(tracker.clone());
        tracker
            .create(jobwatch_types::NewJob {
                id: Some("a1".into()),
                job_type: jobwatch_types::JobType::Analysis,
                owner_scope: "c".into(),
                title: "Acme".into(),
                resource_id: None,
            })
            .unwrap();
        assert!(state.registry().get("a1").is_some());
    }
}
