//! Observer-side view of one job.

use chrono::{DateTime, Utc};
use serde::Serialize;

use jobwatch_types::{Job, JobStatus, ProgressEvent, StepStatus};

/// What the observer knows about a job, plus observer-only flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job: Job,
    /// Tracked locally but not yet seen in a registry snapshot.
    pub awaiting_confirmation: bool,
    /// The action-plan safety timeout fired before the job finished.
    pub timed_out: bool,
}

impl JobView {
    pub fn confirmed(job: Job) -> Self {
        Self {
            job,
            awaiting_confirmation: false,
            timed_out: false,
        }
    }

    pub fn unconfirmed(job: Job) -> Self {
        Self {
            job,
            awaiting_confirmation: true,
            timed_out: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.job.id
    }

    pub fn is_terminal(&self) -> bool {
        self.job.is_terminal()
    }

    /// Apply a pushed progress event. Returns `true` if the view changed.
    pub fn apply_progress(&mut self, event: &ProgressEvent, at: DateTime<Utc>) -> bool {
        let before = self.job.clone();
        self.job.apply_progress(&event.as_update(), at);
        !same_progress(&before, &self.job)
    }

    /// Fold a non-terminal registry snapshot into this view.
    ///
    /// Identity fields come from the snapshot. Progress only moves forward:
    /// the higher percentage wins and no step un-completes.
    pub fn merge_snapshot(&mut self, snapshot: &Job) -> bool {
        let before = self.clone();
        self.awaiting_confirmation = false;
        if self.is_terminal() {
            self.job.title.clone_from(&snapshot.title);
            return *self != before;
        }

        let mut merged = snapshot.clone();
        if merged.status == JobStatus::Pending && self.job.status == JobStatus::InProgress {
            merged.status = JobStatus::InProgress;
        }
        if self.job.progress_percentage > merged.progress_percentage {
            merged.progress_percentage = self.job.progress_percentage;
            merged.status_message.clone_from(&self.job.status_message);
        }
        let local_step = self.job.steps.current_index();
        let local_status = self.job.steps.get(local_step).unwrap_or(StepStatus::Pending);
        merged.steps.apply(local_step, local_status);
        merged.step_index = merged.steps.current_index();
        merged.resource_id = None;
        self.job = merged;
        *self != before
    }
}

fn same_progress(a: &Job, b: &Job) -> bool {
    a.status == b.status
        && a.progress_percentage == b.progress_percentage
        && a.status_message == b.status_message
        && a.steps == b.steps
}

/// Views newest first, ties by id.
pub fn sort_views(views: &mut [JobView]) {
    views.sort_by(|a, b| {
        b.job
            .created_at
            .cmp(&a.job.created_at)
            .then_with(|| a.job.id.cmp(&b.job.id))
    });
}
