//! Shared types for jobwatch: the job record, its step tracker, push events
//! and the HTTP request/response bodies used by the server and observers.

pub mod api;
pub mod event;
pub mod job;
pub mod steps;

pub use api::{
    CompleteRequest, ErrorRequest, MutationResponse, NewJob, ResourceDocument, ResourceStatus,
    Settlement,
};
pub use event::{CompleteEvent, ErrorEvent, EventDecodeError, JobEvent, ProgressEvent, RESYNC_EVENT};
pub use job::{Job, JobStatus, JobType, ProgressUpdate, UpdateError};
pub use steps::{StepStatus, Steps};
