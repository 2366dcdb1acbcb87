//! How a job finished, and the slot that lets it finish only once.

use std::sync::OnceLock;

use jobwatch_types::{Job, JobEvent, JobStatus, Settlement};

/// Shown when a job failed without saying why.
pub const GENERIC_FAILURE: &str = "The operation failed.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Completed { resource_id: Option<String> },
    Errored { message: String },
}

impl TerminalEvent {
    /// Terminal outcome carried by a push event, if any.
    pub fn from_event(event: &JobEvent) -> Option<Self> {
        match event {
            JobEvent::Progress(_) => None,
            JobEvent::Complete(e) => Some(TerminalEvent::Completed {
                resource_id: e.resource_id.clone(),
            }),
            JobEvent::Error(e) => Some(TerminalEvent::Errored {
                message: e.message.clone(),
            }),
        }
    }

    /// Terminal outcome recorded in a registry snapshot, if any.
    pub fn from_job(job: &Job) -> Option<Self> {
        match job.status {
            JobStatus::Completed => Some(TerminalEvent::Completed {
                resource_id: job.resource_id.clone(),
            }),
            JobStatus::Error => Some(TerminalEvent::Errored {
                message: job.status_message.clone(),
            }),
            JobStatus::Pending | JobStatus::InProgress => None,
        }
    }

    /// Terminal outcome of a settled resource status read by the poller.
    pub fn from_settlement(settlement: Settlement, resource_id: &str) -> Self {
        match settlement {
            Settlement::Completed => TerminalEvent::Completed {
                resource_id: Some(resource_id.to_string()),
            },
            Settlement::Failed { message } => TerminalEvent::Errored {
                message: message.unwrap_or_default(),
            },
        }
    }

    /// The error message to show: verbatim, or the generic fallback when blank.
    pub fn display_message(&self) -> Option<&str> {
        match self {
            TerminalEvent::Completed { .. } => None,
            TerminalEvent::Errored { message } if message.trim().is_empty() => {
                Some(GENERIC_FAILURE)
            }
            TerminalEvent::Errored { message } => Some(message),
        }
    }

    /// Write this outcome into a job record. No-op if the job is already terminal.
    pub fn apply_to(&self, job: &mut Job, at: chrono::DateTime<chrono::Utc>) -> bool {
        match self {
            TerminalEvent::Completed { resource_id } => job.complete(resource_id.clone(), at),
            TerminalEvent::Errored { message } => job.fail(message.clone(), at),
        }
    }
}

/// A slot that accepts exactly one [`TerminalEvent`].
#[derive(Debug, Default)]
pub struct ResolveOnce {
    slot: OnceLock<TerminalEvent>,
}

impl ResolveOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that filled the slot.
    pub fn resolve(&self, event: TerminalEvent) -> bool {
        self.slot.set(event).is_ok()
    }

    pub fn get(&self) -> Option<&TerminalEvent> {
        self.slot.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }
}
