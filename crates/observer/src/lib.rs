//! Jobwatch observer library.
//!
//! Keeps a live view of one owner scope's jobs: a registry snapshot merged
//! with the server's SSE push stream, a fallback poller for transcription
//! jobs and a safety timeout for action plans. Finished jobs are handed to a
//! [`Presenter`] exactly once.

pub mod api;
pub mod config;
pub mod error;
pub mod observer;
pub mod poller;
pub mod render;
pub mod stream;
pub mod terminal;
pub mod view;

pub use api::{HttpClient, JobApi, PushConnector, PushStream, RawEvent};
pub use config::ObserverConfig;
pub use error::{ObserverError, ObserverResult};
pub use observer::{ObserverContext, ObserverHandle, Presenter, ProcessObserver, FETCH_FAILURE};
pub use render::TerminalPresenter;
pub use terminal::{ResolveOnce, TerminalEvent, GENERIC_FAILURE};
pub use view::JobView;
