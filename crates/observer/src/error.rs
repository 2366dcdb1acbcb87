//! Errors surfaced by the observer and its HTTP client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObserverError {
    /// Connection-level failure: refused, reset, timed out, stream cut.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body did not parse.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Only terminal jobs may be dismissed.
    #[error("job {0} is still running and cannot be dismissed")]
    NotDismissable(String),

    /// The observer has shut down.
    #[error("observer is closed")]
    Closed,
}

impl From<reqwest::Error> for ObserverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ObserverError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ObserverError::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            ObserverError::Transport(err.to_string())
        }
    }
}

pub type ObserverResult<T> = Result<T, ObserverError>;
