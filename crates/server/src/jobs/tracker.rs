//! Entry point for operation triggers: mutate the registry, then broadcast.

use std::sync::Arc;

use uuid::Uuid;

use jobwatch_types::{Job, JobEvent, NewJob, ProgressUpdate};

use super::broadcaster::ProgressBroadcaster;
use super::registry::{JobRegistry, Mutation, RegistryError};
use crate::metrics::record_job_registered;

/// Registry + broadcaster pair handed to operation triggers.
///
/// Only mutations the registry accepted are published, and the published
/// event carries the job's state after clamping, so a stale report never
/// reaches observers as a regression.
#[derive(Clone)]
pub struct JobTracker {
    registry: Arc<JobRegistry>,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl JobTracker {
    pub fn new(registry: Arc<JobRegistry>, broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self {
            registry,
            broadcaster,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    /// Create and register a job, generating an id when the caller has none.
    pub fn create(&self, request: NewJob) -> Result<Job, RegistryError> {
        let id = request
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let job = Job::new(id, request.job_type, request.owner_scope, request.title)
            .with_target_resource(request.resource_id);
        self.registry.register(job.clone())?;
        record_job_registered(job.job_type);
        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            owner_scope = %job.owner_scope,
            "job registered"
        );
        Ok(job)
    }

    pub fn update_progress(
        &self,
        id: &str,
        update: &ProgressUpdate,
    ) -> Result<Mutation, RegistryError> {
        let mutation = self.registry.update_progress(id, update)?;
        self.publish_if_applied(&mutation, JobEvent::progress_of);
        Ok(mutation)
    }

    pub fn mark_complete(
        &self,
        id: &str,
        resource_id: Option<String>,
    ) -> Result<Mutation, RegistryError> {
        let mutation = self.registry.mark_complete(id, resource_id)?;
        if mutation.applied() {
            tracing::info!(job_id = id, resource_id = ?mutation.job().resource_id, "job completed");
        }
        self.publish_if_applied(&mutation, JobEvent::complete_of);
        Ok(mutation)
    }

    pub fn mark_error(&self, id: &str, message: &str) -> Result<Mutation, RegistryError> {
        let mutation = self.registry.mark_error(id, message)?;
        if mutation.applied() {
            tracing::warn!(job_id = id, message, "job failed");
        }
        self.publish_if_applied(&mutation, JobEvent::error_of);
        Ok(mutation)
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = self.registry.remove(id);
        tracing::debug!(job_id = id, removed, "job dismissed");
        removed
    }

    fn publish_if_applied(&self, mutation: &Mutation, to_event: fn(&Job) -> JobEvent) {
        match mutation {
            Mutation::Applied(job) => {
                self.broadcaster.publish(&job.owner_scope, to_event(job));
            }
            Mutation::Ignored(job) => {
                tracing::debug!(job_id = %job.id, status = ?job.status, "update after terminal ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_types::{JobType, StepStatus};

    fn tracker() -> JobTracker {
        JobTracker::new(
            Arc::new(JobRegistry::new()),
            Arc::new(ProgressBroadcaster::default()),
        )
    }

    fn new_job(id: Option<&str>, job_type: JobType) -> NewJob {
        NewJob {
            id: id.map(str::to_string),
            job_type,
            owner_scope: "client-1".into(),
            title: "Quarterly review".into(),
            resource_id: None,
        }
    }

    #[test]
    fn test_create_generates_id_when_missing() {
        let tracker = tracker();
        let job = tracker.create(new_job(None, JobType::Analysis)).unwrap();
        assert!(Uuid::parse_str(&job.id).is_ok());
        assert_eq!(tracker.registry().get(&job.id), Some(job));
    }

    #[test]
    fn test_create_keeps_caller_id() {
        let tracker = tracker();
        let job = tracker.create(new_job(Some("plan-7"), JobType::ActionPlan)).unwrap();
        assert_eq!(job.id, "plan-7");
        assert!(matches!(
            tracker.create(new_job(Some("plan-7"), JobType::ActionPlan)),
            Err(RegistryError::DuplicateId(_))
        ));
    }

    #[tokio::test]
    async fn test_publishes_clamped_progress_and_single_terminal() {
        let tracker = tracker();
        let mut sub = tracker.broadcaster().subscribe("client-1");
        let job = tracker.create(new_job(Some("a1"), JobType::Analysis)).unwrap();

        let report = |percentage| ProgressUpdate {
            percentage,
            message: "working".into(),
            step: 2,
            step_status: StepStatus::Active,
        };
        tracker.update_progress(&job.id, &report(50)).unwrap();
        tracker.update_progress(&job.id, &report(30)).unwrap();
        tracker.mark_complete(&job.id, Some("r-1".into())).unwrap();
        assert!(!tracker.mark_error(&job.id, "late").unwrap().applied());

        let mut seen = Vec::new();
        while let Ok(event) = sub.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 3);
        match (&seen[0], &seen[1]) {
            (JobEvent::Progress(a), JobEvent::Progress(b)) => {
                assert_eq!(a.percentage, 50);
                assert_eq!(b.percentage, 50);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(matches!(seen[2], JobEvent::Complete(_)));
    }
}
