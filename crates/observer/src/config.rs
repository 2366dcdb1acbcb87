//! Observer timing and endpoint configuration.

use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:47892";

/// Settings for one [`ProcessObserver`](crate::ProcessObserver).
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub owner_scope: String,
    /// Fixed delay before re-subscribing after the push stream drops.
    pub reconnect_delay: Duration,
    /// Delay from a transcription job's `createdAt` before polling starts.
    pub poll_grace: Duration,
    pub poll_interval: Duration,
    /// Safety timeout for action-plan jobs, from `createdAt`.
    pub action_plan_timeout: Duration,
}

impl ObserverConfig {
    pub fn new(owner_scope: impl Into<String>) -> Self {
        Self {
            owner_scope: owner_scope.into(),
            ..Self::default()
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            owner_scope: String::new(),
            reconnect_delay: Duration::from_secs(5),
            poll_grace: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            action_plan_timeout: Duration::from_secs(600),
        }
    }
}
