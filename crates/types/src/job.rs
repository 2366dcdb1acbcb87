//! The job record shared by the registry, the push channel and observers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::steps::{StepStatus, Steps};

/// Kind of long-running operation a job tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    Analysis,
    Transcription,
    ActionPlan,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Analysis => "analysis",
            JobType::Transcription => "transcription",
            JobType::ActionPlan => "action-plan",
        }
    }

    /// Push delivery for very long transcriptions has gaps, so observers
    /// back it up with the fallback poller.
    pub fn uses_fallback_poll(&self) -> bool {
        matches!(self, JobType::Transcription)
    }

    /// Observers give up waiting on action plans after the safety timeout.
    pub fn has_safety_timeout(&self) -> bool {
        matches!(self, JobType::ActionPlan)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Rejected progress update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("percentage {0} is outside 0..=100")]
    PercentageOutOfRange(u8),

    #[error("step {0} is outside 1..={max}", max = Steps::COUNT)]
    StepOutOfRange(u8),
}

/// A progress report from a running operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub percentage: u8,
    #[serde(default)]
    pub message: String,
    pub step: u8,
    pub step_status: StepStatus,
}

impl ProgressUpdate {
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.percentage > 100 {
            return Err(UpdateError::PercentageOutOfRange(self.percentage));
        }
        if !Steps::is_valid(self.step) {
            return Err(UpdateError::StepOutOfRange(self.step));
        }
        Ok(())
    }
}

/// One tracked long-running operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub owner_scope: String,
    pub title: String,
    pub status: JobStatus,
    pub progress_percentage: u8,
    #[serde(default)]
    pub status_message: String,
    pub step_index: u8,
    #[serde(default)]
    pub steps: Steps,
    /// Set only once the job has completed.
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Resource the operation writes to, known from creation.
    #[serde(default)]
    pub target_resource_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh `pending` job created now.
    pub fn new(
        id: impl Into<String>,
        job_type: JobType,
        owner_scope: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            job_type,
            owner_scope: owner_scope.into(),
            title: title.into(),
            status: JobStatus::Pending,
            progress_percentage: 0,
            status_message: String::new(),
            step_index: 1,
            steps: Steps::default(),
            resource_id: None,
            target_resource_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_target_resource(mut self, resource_id: Option<String>) -> Self {
        self.target_resource_id = resource_id;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Resource id to poll or fetch: the completed resource, else the target,
    /// else the job id itself.
    pub fn resource_key(&self) -> &str {
        self.resource_id
            .as_deref()
            .or(self.target_resource_id.as_deref())
            .unwrap_or(&self.id)
    }

    /// Apply a progress report. Returns `false` if the job is terminal and the
    /// report was ignored.
    ///
    /// The percentage never decreases; a report carrying a lower percentage
    /// than already seen keeps the current message too, since it is stale.
    pub fn apply_progress(&mut self, update: &ProgressUpdate, at: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self.status == JobStatus::Pending {
            self.status = JobStatus::InProgress;
        }
        let percentage = update.percentage.min(100);
        if percentage >= self.progress_percentage {
            self.progress_percentage = percentage;
            if !update.message.is_empty() {
                self.status_message.clone_from(&update.message);
            }
        }
        self.steps.apply(update.step, update.step_status);
        self.step_index = self.steps.current_index();
        self.updated_at = at;
        true
    }

    /// Transition to `completed`. Returns `false` if already terminal.
    pub fn complete(&mut self, resource_id: Option<String>, at: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress_percentage = 100;
        self.resource_id = resource_id.or_else(|| self.target_resource_id.clone());
        self.steps.complete_all();
        self.step_index = Steps::COUNT;
        self.updated_at = at;
        true
    }

    /// Transition to `error`. Returns `false` if already terminal.
    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Error;
        self.status_message = message.into();
        self.steps.fail_current();
        self.updated_at = at;
        true
    }
}
