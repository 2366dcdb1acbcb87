//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric definitions for job registration and push delivery
//! - Helper functions for recording metrics

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use jobwatch_types::JobType;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "jobwatch_jobs_registered_total",
        "Jobs registered, by job type"
    );
    describe_counter!(
        "jobwatch_events_published_total",
        "Push events delivered to at least one observer, by kind"
    );
    describe_counter!(
        "jobwatch_event_deliveries_total",
        "Per-observer push deliveries, by kind"
    );
    describe_counter!(
        "jobwatch_events_dropped_total",
        "Push events published while no observer was connected, by kind"
    );
    describe_gauge!(
        "jobwatch_push_subscribers",
        "Connected push observers, by owner scope"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_job_registered(job_type: JobType) {
    counter!("jobwatch_jobs_registered_total", "type" => job_type.as_str()).increment(1);
}

pub fn record_event_published(kind: &'static str, observers: usize) {
    counter!("jobwatch_events_published_total", "kind" => kind).increment(1);
    counter!("jobwatch_event_deliveries_total", "kind" => kind).increment(observers as u64);
}

pub fn record_event_dropped(kind: &'static str) {
    counter!("jobwatch_events_dropped_total", "kind" => kind).increment(1);
}

pub fn set_push_subscribers(owner_scope: &str, count: usize) {
    gauge!("jobwatch_push_subscribers", "owner_scope" => owner_scope.to_string()).set(count as f64);
}
