//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::job::{Job, JobType};

/// `POST /api/jobs` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    /// Caller-supplied id; the server generates one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub owner_scope: String,
    pub title: String,
    /// Resource the operation will write to, if already known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

/// `POST /api/jobs/{id}/complete` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(default)]
    pub resource_id: Option<String>,
}

/// `POST /api/jobs/{id}/error` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ErrorRequest {
    pub message: String,
}

/// Result of a trigger-side mutation. `applied` is `false` when the job was
/// already terminal and the mutation was discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub applied: bool,
    pub job: Job,
}

/// `GET /api/resources/{type}/{id}/status` body, read by the fallback poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub in_progress: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// What a settled resource status means for its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Completed,
    Failed { message: Option<String> },
}

impl ResourceStatus {
    /// `None` while the resource is still being produced.
    pub fn settlement(&self) -> Option<Settlement> {
        if self.in_progress {
            return None;
        }
        Some(if self.error {
            Settlement::Failed {
                message: self.error_message.clone().filter(|m| !m.trim().is_empty()),
            }
        } else {
            Settlement::Completed
        })
    }
}

/// `GET /api/resources/{type}/{id}` body: the finished resource as far as
/// this service knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ResourceDocument {
    #[serde(rename = "type")]
    pub resource_type: JobType,
    pub resource_id: String,
    pub job_id: String,
    pub title: String,
    pub completed_at: DateTime<Utc>,
}
