//! Authoritative in-memory store of jobs, partitioned by owner scope.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use thiserror::Error;

use jobwatch_types::{Job, JobType, ProgressUpdate, UpdateError};

/// Errors returned by [`JobRegistry`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("job id already registered: {0}")]
    DuplicateId(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("invalid update: {0}")]
    InvalidUpdate(#[from] UpdateError),
}

/// Outcome of a mutation on an existing job.
///
/// `Ignored` means the job was already terminal; the snapshot is returned
/// either way so callers can report current truth.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Applied(Job),
    Ignored(Job),
}

impl Mutation {
    pub fn applied(&self) -> bool {
        matches!(self, Mutation::Applied(_))
    }

    pub fn job(&self) -> &Job {
        match self {
            Mutation::Applied(job) | Mutation::Ignored(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            Mutation::Applied(job) | Mutation::Ignored(job) => job,
        }
    }
}

/// Job store with one lock per job.
///
/// The outer `RwLock` is only held to look up, insert, remove or snapshot
/// entries, never across a job mutation, so writers to different jobs do
/// not contend. Each job's `Mutex` serializes writers to that job, which is
/// what makes "first terminal write wins" hold under concurrent callers.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new job. Ids are unique across the whole registry.
    pub fn register(&self, job: Job) -> Result<String, RegistryError> {
        if job.id.trim().is_empty() {
            return Err(RegistryError::InvalidJob("id must not be empty".into()));
        }
        if job.owner_scope.trim().is_empty() {
            return Err(RegistryError::InvalidJob("ownerScope must not be empty".into()));
        }
        if job.title.trim().is_empty() {
            return Err(RegistryError::InvalidJob("title must not be empty".into()));
        }

        let id = job.id.clone();
        let mut jobs = self.jobs.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned writing jobs map: {e}");
            e.into_inner()
        });
        if jobs.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        jobs.insert(id.clone(), Arc::new(Mutex::new(job)));
        Ok(id)
    }

    /// Snapshot of an owner scope's jobs, newest first.
    pub fn list(&self, owner_scope: &str) -> Vec<Job> {
        let entries: Vec<Arc<Mutex<Job>>> = match self.jobs.read() {
            Ok(jobs) => jobs.values().cloned().collect(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                e.into_inner().values().cloned().collect()
            }
        };

        let mut jobs: Vec<Job> = entries
            .iter()
            .map(|entry| lock_job(entry).clone())
            .filter(|job| job.owner_scope == owner_scope)
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        let entry = self.entry(id)?;
        let job = lock_job(&entry).clone();
        Some(job)
    }

    /// Find the job a resource belongs to, by completed or target resource id.
    /// A job with neither is addressed by its own id.
    pub fn find_by_resource(&self, job_type: JobType, resource_id: &str) -> Option<Job> {
        let entries: Vec<Arc<Mutex<Job>>> = match self.jobs.read() {
            Ok(jobs) => jobs.values().cloned().collect(),
            Err(e) => e.into_inner().values().cloned().collect(),
        };
        entries
            .iter()
            .map(|entry| lock_job(entry).clone())
            .filter(|job| job.job_type == job_type)
            .find(|job| {
                job.resource_key() == resource_id
                    || job.target_resource_id.as_deref() == Some(resource_id)
            })
    }

    /// Apply a progress report: cascade rule plus percentage clamp.
    pub fn update_progress(
        &self,
        id: &str,
        update: &ProgressUpdate,
    ) -> Result<Mutation, RegistryError> {
        update.validate()?;
        self.mutate(id, |job| job.apply_progress(update, Utc::now()))
    }

    pub fn mark_complete(
        &self,
        id: &str,
        resource_id: Option<String>,
    ) -> Result<Mutation, RegistryError> {
        self.mutate(id, |job| job.complete(resource_id, Utc::now()))
    }

    pub fn mark_error(&self, id: &str, message: &str) -> Result<Mutation, RegistryError> {
        self.mutate(id, |job| job.fail(message, Utc::now()))
    }

    /// Delete a job. Unknown ids are fine; returns whether anything was removed.
    pub fn remove(&self, id: &str) -> bool {
        match self.jobs.write() {
            Ok(mut jobs) => jobs.remove(id).is_some(),
            Err(e) => {
                tracing::error!("RwLock poisoned removing job: {e}");
                e.into_inner().remove(id).is_some()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &str) -> Option<Arc<Mutex<Job>>> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                e.into_inner().get(id).cloned()
            }
        }
    }

    fn mutate(
        &self,
        id: &str,
        apply: impl FnOnce(&mut Job) -> bool,
    ) -> Result<Mutation, RegistryError> {
        let entry = self
            .entry(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let mut job = lock_job(&entry);
        if apply(&mut job) {
            Ok(Mutation::Applied(job.clone()))
        } else {
            Ok(Mutation::Ignored(job.clone()))
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_job(entry: &Mutex<Job>) -> MutexGuard<'_, Job> {
    entry.lock().unwrap_or_else(|e| {
        tracing::error!("job mutex poisoned: {e}");
        e.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jobwatch_types::{JobStatus, StepStatus};
    use pretty_assertions::assert_eq;

    fn progress(percentage: u8, step: u8) -> ProgressUpdate {
        ProgressUpdate {
            percentage,
            message: format!("{percentage}%"),
            step,
            step_status: StepStatus::Active,
        }
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let registry = JobRegistry::new();
        let job = Job::new("a1", JobType::Analysis, "client-1", "Acme");
        assert_eq!(registry.register(job.clone()).unwrap(), "a1");
        assert_eq!(
            registry.register(job),
            Err(RegistryError::DuplicateId("a1".into()))
        );
    }

    #[test]
    fn test_register_rejects_blank_fields() {
        let registry = JobRegistry::new();
        let job = Job::new("a1", JobType::Analysis, " ", "Acme");
        assert!(matches!(registry.register(job), Err(RegistryError::InvalidJob(_))));
    }

    #[test]
    fn test_list_is_scoped_and_newest_first() {
        let registry = JobRegistry::new();
        let mut older = Job::new("old", JobType::Analysis, "client-1", "Old");
        older.created_at -= Duration::minutes(5);
        let newer = Job::new("new", JobType::Transcription, "client-1", "New");
        let other = Job::new("other", JobType::Analysis, "client-2", "Other");
        registry.register(older).unwrap();
        registry.register(newer).unwrap();
        registry.register(other).unwrap();

        let ids: Vec<String> = registry.list("client-1").into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
        assert_eq!(registry.list("client-2").len(), 1);
        assert!(registry.list("client-3").is_empty());
    }

    #[test]
    fn test_update_progress_clamps_and_cascades() {
        let registry = JobRegistry::new();
        registry
            .register(Job::new("a1", JobType::Analysis, "c", "Acme"))
            .unwrap();

        registry.update_progress("a1", &progress(50, 3)).unwrap();
        let job = registry.update_progress("a1", &progress(30, 2)).unwrap().into_job();
        assert_eq!(job.progress_percentage, 50);
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.steps.get(1), Some(StepStatus::Completed));
        assert_eq!(job.steps.get(2), Some(StepStatus::Completed));
        assert_eq!(job.steps.get(3), Some(StepStatus::Active));
    }

    #[test]
    fn test_update_progress_validates_input() {
        let registry = JobRegistry::new();
        registry
            .register(Job::new("a1", JobType::Analysis, "c", "Acme"))
            .unwrap();
        assert!(matches!(
            registry.update_progress("a1", &progress(120, 1)),
            Err(RegistryError::InvalidUpdate(UpdateError::PercentageOutOfRange(120)))
        ));
        assert_eq!(
            registry.update_progress("missing", &progress(10, 1)),
            Err(RegistryError::NotFound("missing".into()))
        );
    }

    #[test]
    fn test_first_terminal_write_wins() {
        let registry = JobRegistry::new();
        registry
            .register(Job::new("t1", JobType::Transcription, "c", "Call"))
            .unwrap();

        assert!(registry.mark_complete("t1", Some("tr-1".into())).unwrap().applied());
        let late_error = registry.mark_error("t1", "boom").unwrap();
        assert!(!late_error.applied());
        let late_progress = registry.update_progress("t1", &progress(10, 1)).unwrap();
        assert!(!late_progress.applied());

        let job = registry.get("t1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.resource_id.as_deref(), Some("tr-1"));
    }

    #[test]
    fn test_concurrent_terminal_writes_have_one_winner() {
        let registry = Arc::new(JobRegistry::new());
        registry
            .register(Job::new("race", JobType::Analysis, "c", "Race"))
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        registry.mark_complete("race", Some(format!("r-{i}"))).unwrap().applied()
                    } else {
                        registry.mark_error("race", &format!("e-{i}")).unwrap().applied()
                    }
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();
        assert_eq!(winners, 1);
        assert!(registry.get("race").unwrap().is_terminal());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = JobRegistry::new();
        registry
            .register(Job::new("a1", JobType::Analysis, "c", "Acme"))
            .unwrap();
        registry.mark_complete("a1", None).unwrap();
        assert!(registry.remove("a1"));
        assert!(!registry.remove("a1"));
        assert!(!registry.remove("never-existed"));
        assert!(registry.list("c").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_by_resource_matches_target() {
        let registry = JobRegistry::new();
        registry
            .register(
                Job::new("t1", JobType::Transcription, "c", "Call")
                    .with_target_resource(Some("tr-7".into())),
            )
            .unwrap();
        assert_eq!(
            registry.find_by_resource(JobType::Transcription, "tr-7").map(|j| j.id),
            Some("t1".to_string())
        );
        assert!(registry.find_by_resource(JobType::Analysis, "tr-7").is_none());
    }
}
