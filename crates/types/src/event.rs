//! Push-channel events.
//!
//! On the SSE wire the event name carries the kind (`progress`, `complete`,
//! `error`) and the data line carries the JSON payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::job::{Job, JobType, ProgressUpdate};
use crate::steps::StepStatus;

/// Event name telling an observer it missed events and must re-list.
pub const RESYNC_EVENT: &str = "resync";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: String,
    pub job_type: JobType,
    pub percentage: u8,
    #[serde(default)]
    pub message: String,
    pub step: u8,
    pub step_status: StepStatus,
}

impl ProgressEvent {
    pub fn as_update(&self) -> ProgressUpdate {
        ProgressUpdate {
            percentage: self.percentage,
            message: self.message.clone(),
            step: self.step,
            step_status: self.step_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct CompleteEvent {
    pub job_id: String,
    pub job_type: JobType,
    #[serde(default)]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub job_id: String,
    pub job_type: JobType,
    #[serde(default)]
    pub message: String,
}

/// An event fanned out to every observer of an owner scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    Progress(ProgressEvent),
    Complete(CompleteEvent),
    Error(ErrorEvent),
}

/// Push payload that could not be understood.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl JobEvent {
    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Progress(_) => "progress",
            JobEvent::Complete(_) => "complete",
            JobEvent::Error(_) => "error",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Progress(e) => &e.job_id,
            JobEvent::Complete(e) => &e.job_id,
            JobEvent::Error(e) => &e.job_id,
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobEvent::Progress(e) => e.job_type,
            JobEvent::Complete(e) => e.job_type,
            JobEvent::Error(e) => e.job_type,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress(_))
    }

    /// JSON for the SSE data line (payload only, no kind tag).
    pub fn to_data(&self) -> serde_json::Result<String> {
        match self {
            JobEvent::Progress(e) => serde_json::to_string(e),
            JobEvent::Complete(e) => serde_json::to_string(e),
            JobEvent::Error(e) => serde_json::to_string(e),
        }
    }

    /// Parse an SSE event name + data line.
    pub fn decode(kind: &str, data: &str) -> Result<Self, EventDecodeError> {
        let malformed = |source| EventDecodeError::Malformed {
            kind: kind.to_string(),
            source,
        };
        match kind {
            "progress" => serde_json::from_str(data).map(JobEvent::Progress).map_err(malformed),
            "complete" => serde_json::from_str(data).map(JobEvent::Complete).map_err(malformed),
            "error" => serde_json::from_str(data).map(JobEvent::Error).map_err(malformed),
            other => Err(EventDecodeError::UnknownKind(other.to_string())),
        }
    }

    /// Progress event carrying the job's current (already clamped) state.
    pub fn progress_of(job: &Job) -> Self {
        JobEvent::Progress(ProgressEvent {
            job_id: job.id.clone(),
            job_type: job.job_type,
            percentage: job.progress_percentage,
            message: job.status_message.clone(),
            step: job.step_index,
            step_status: job.steps.get(job.step_index).unwrap_or(StepStatus::Pending),
        })
    }

    pub fn complete_of(job: &Job) -> Self {
        JobEvent::Complete(CompleteEvent {
            job_id: job.id.clone(),
            job_type: job.job_type,
            resource_id: job.resource_id.clone(),
        })
    }

    pub fn error_of(job: &Job) -> Self {
        JobEvent::Error(ErrorEvent {
            job_id: job.id.clone(),
            job_type: job.job_type,
            message: job.status_message.clone(),
        })
    }
}
