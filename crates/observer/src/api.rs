//! The observer's view of the server: registry reads, dismissal, resource
//! status and the SSE push stream.
//!
//! Both seams are traits so the observer can be driven by an in-memory fake;
//! [`HttpClient`] is the production implementation of both.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Url;

use jobwatch_types::{Job, JobType, ResourceDocument, ResourceStatus};

use crate::error::{ObserverError, ObserverResult};

/// One SSE frame as received: event name and raw data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub event: String,
    pub data: String,
}

/// A live push subscription. Ends (or yields an error) when the transport drops.
pub type PushStream = BoxStream<'static, ObserverResult<RawEvent>>;

#[async_trait]
pub trait JobApi: Send + Sync {
    /// Registry snapshot for an owner scope, newest first.
    async fn list(&self, owner_scope: &str) -> ObserverResult<Vec<Job>>;

    /// Dismiss a job. Unknown ids are not an error.
    async fn remove(&self, job_id: &str) -> ObserverResult<()>;

    async fn resource_status(
        &self,
        resource_type: JobType,
        resource_id: &str,
    ) -> ObserverResult<ResourceStatus>;

    async fn fetch_resource(
        &self,
        resource_type: JobType,
        resource_id: &str,
    ) -> ObserverResult<ResourceDocument>;
}

#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, owner_scope: &str) -> ObserverResult<PushStream>;
}

/// reqwest-backed client for a jobwatch server.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:47892`.
    pub fn new(base_url: impl Into<String>) -> ObserverResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ObserverError::Transport(e.to_string()))?;
        let base_url: String = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| ObserverError::Transport(format!("invalid server URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ObserverError::Transport(format!(
                "server URL {base_url} cannot carry a path"
            )));
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// `{base}/api/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> ObserverResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ObserverError::Transport(format!("server URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl JobApi for HttpClient {
    async fn list(&self, owner_scope: &str) -> ObserverResult<Vec<Job>> {
        let jobs = self
            .http
            .get(self.url(&["jobs"])?)
            .query(&[("ownerScope", owner_scope)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(jobs)
    }

    async fn remove(&self, job_id: &str) -> ObserverResult<()> {
        self.http
            .delete(self.url(&["jobs", job_id])?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn resource_status(
        &self,
        resource_type: JobType,
        resource_id: &str,
    ) -> ObserverResult<ResourceStatus> {
        let status = self
            .http
            .get(self.url(&["resources", resource_type.as_str(), resource_id, "status"])?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }

    async fn fetch_resource(
        &self,
        resource_type: JobType,
        resource_id: &str,
    ) -> ObserverResult<ResourceDocument> {
        let document = self
            .http
            .get(self.url(&["resources", resource_type.as_str(), resource_id])?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(document)
    }
}

#[async_trait]
impl PushConnector for HttpClient {
    async fn connect(&self, owner_scope: &str) -> ObserverResult<PushStream> {
        let response = self
            .http
            .get(self.url(&["jobs", "stream"])?)
            .query(&[("ownerScope", owner_scope)])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let events = response.bytes_stream().eventsource().map(|item| match item {
            Ok(event) => Ok(RawEvent {
                event: event.event,
                data: event.data,
            }),
            Err(e) => Err(ObserverError::Transport(e.to_string())),
        });
        Ok(events.boxed())
    }
}
