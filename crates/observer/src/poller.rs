//! Fallback poller for jobs whose push delivery is not trusted on its own.
//!
//! Waits out a grace period from the job's `createdAt`, then reads the
//! resource status every interval until it settles or the observer cancels.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use jobwatch_types::{Job, JobType, Settlement};

use crate::api::JobApi;

/// A settled status read by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub job_id: String,
    pub resource_id: String,
    pub settlement: Settlement,
}

#[derive(Debug, Clone)]
pub struct PollSchedule {
    pub grace: Duration,
    pub interval: Duration,
}

impl PollSchedule {
    /// Delay from now until the first tick: `grace + interval` after creation.
    pub fn first_tick_in(&self, job: &Job) -> Duration {
        let since_created = (Utc::now() - job.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.grace.saturating_sub(since_created) + self.interval
    }
}

/// Spawn a poller for `job`. Sends at most one [`PollOutcome`], then exits.
pub fn spawn_fallback_poller<M>(
    api: Arc<dyn JobApi>,
    job: &Job,
    schedule: PollSchedule,
    tx: mpsc::UnboundedSender<M>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    M: From<PollOutcome> + Send + 'static,
{
    let job_id = job.id.clone();
    let job_type: JobType = job.job_type;
    let resource_id = job.resource_key().to_string();
    let first_tick = schedule.first_tick_in(job);

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + first_tick, schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                _ = cancel.cancelled() => return,
                status = api.resource_status(job_type, &resource_id) => status,
            };

            match status.map(|s| s.settlement()) {
                Ok(Some(settlement)) => {
                    debug!(%job_id, %resource_id, ?settlement, "poller observed terminal status");
                    let _ = tx.send(
                        PollOutcome {
                            job_id,
                            resource_id,
                            settlement,
                        }
                        .into(),
                    );
                    return;
                }
                Ok(None) => debug!(%job_id, %resource_id, "resource still in progress"),
                Err(e) => warn!(%job_id, %resource_id, error = %e, "status poll failed, retrying next tick"),
            }
        }
    })
}
