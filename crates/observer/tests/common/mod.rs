//! Shared fakes for observer tests: an in-memory backend that plays both the
//! registry API and the push connector, and a presenter that records calls.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};

use jobwatch_observer::{
    JobApi, JobView, ObserverConfig, ObserverError, ObserverResult, Presenter, PushConnector,
    PushStream, RawEvent,
};
use jobwatch_types::{Job, JobEvent, JobType, ResourceDocument, ResourceStatus};

pub const SCOPE: &str = "client-1";

pub type PushSender = mpsc::UnboundedSender<ObserverResult<RawEvent>>;

#[derive(Default)]
pub struct FakeBackend {
    pub jobs: Mutex<Vec<Job>>,
    statuses: Mutex<VecDeque<ObserverResult<ResourceStatus>>>,
    connections: Mutex<VecDeque<mpsc::UnboundedReceiver<ObserverResult<RawEvent>>>>,
    pub list_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    /// Every (type, resource id) the fallback poller asked about, in order.
    pub polled: Mutex<Vec<(JobType, String)>>,
    pub connects: AtomicUsize,
    pub removed: Mutex<Vec<String>>,
    pub fetched: Mutex<Vec<String>>,
    pub fail_fetch: Mutex<bool>,
    pub fail_remove: Mutex<bool>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_job(&self, job: Job) {
        self.jobs.lock().unwrap().push(job);
    }

    /// Replace a registry record, as the server would after a mutation.
    pub fn update_job(&self, id: &str, update: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            update(job);
        }
    }

    pub fn script_status(&self, status: ObserverResult<ResourceStatus>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    /// Queue the next push connection and return its sending side. Dropping
    /// the sender ends the stream, like the server going away.
    pub fn open_connection(&self) -> PushSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().unwrap().push_back(rx);
        tx
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn polled(&self) -> Vec<(JobType, String)> {
        self.polled.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobApi for FakeBackend {
    async fn list(&self, owner_scope: &str) -> ObserverResult<Vec<Job>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.owner_scope == owner_scope)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn remove(&self, job_id: &str) -> ObserverResult<()> {
        if *self.fail_remove.lock().unwrap() {
            return Err(ObserverError::Transport("connection refused".into()));
        }
        self.removed.lock().unwrap().push(job_id.to_string());
        self.jobs.lock().unwrap().retain(|j| j.id != job_id);
        Ok(())
    }

    async fn resource_status(
        &self,
        resource_type: JobType,
        resource_id: &str,
    ) -> ObserverResult<ResourceStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.polled
            .lock()
            .unwrap()
            .push((resource_type, resource_id.to_string()));
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(in_progress()))
    }

    async fn fetch_resource(
        &self,
        resource_type: JobType,
        resource_id: &str,
    ) -> ObserverResult<ResourceDocument> {
        self.fetched.lock().unwrap().push(resource_id.to_string());
        if *self.fail_fetch.lock().unwrap() {
            return Err(ObserverError::Status {
                status: 404,
                url: format!("/api/resources/{resource_type}/{resource_id}"),
            });
        }
        Ok(ResourceDocument {
            resource_type,
            resource_id: resource_id.to_string(),
            job_id: String::new(),
            title: String::new(),
            completed_at: Utc::now(),
        })
    }
}

#[async_trait]
impl PushConnector for FakeBackend {
    async fn connect(&self, _owner_scope: &str) -> ObserverResult<PushStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.connections.lock().unwrap().pop_front() {
            Some(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed()),
            None => Err(ObserverError::Transport("connection refused".into())),
        }
    }
}

pub fn in_progress() -> ResourceStatus {
    ResourceStatus {
        in_progress: true,
        error: false,
        error_message: None,
    }
}

pub fn settled(error: Option<&str>) -> ResourceStatus {
    ResourceStatus {
        in_progress: false,
        error: error.is_some(),
        error_message: error.map(str::to_string),
    }
}

/// Encode an event the way the server's SSE stream frames it.
pub fn frame(event: &JobEvent) -> ObserverResult<RawEvent> {
    Ok(RawEvent {
        event: event.kind().to_string(),
        data: event.to_data().unwrap(),
    })
}

pub fn job(id: &str, job_type: JobType) -> Job {
    Job::new(id, job_type, SCOPE, format!("job {id}"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shown {
    Result { job_id: String, resource_id: String },
    Error { job_id: String, message: String },
    Timeout { job_id: String },
}

#[derive(Default)]
pub struct Recorded {
    pub shown: Vec<Shown>,
    /// Every rendered (job id, percentage), in order.
    pub renders: Vec<(String, u8)>,
}

#[derive(Clone, Default)]
pub struct RecordingPresenter(pub Arc<Mutex<Recorded>>);

impl RecordingPresenter {
    pub fn shown(&self) -> Vec<Shown> {
        self.0.lock().unwrap().shown.clone()
    }

    pub fn percentages(&self, job_id: &str) -> Vec<u8> {
        self.0
            .lock()
            .unwrap()
            .renders
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, pct)| *pct)
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn render(&mut self, views: &[JobView]) {
        let mut recorded = self.0.lock().unwrap();
        for view in views {
            recorded
                .renders
                .push((view.job.id.clone(), view.job.progress_percentage));
        }
    }

    fn show_result(&mut self, view: &JobView, document: &ResourceDocument) {
        self.0.lock().unwrap().shown.push(Shown::Result {
            job_id: view.job.id.clone(),
            resource_id: document.resource_id.clone(),
        });
    }

    fn show_error(&mut self, view: &JobView, message: &str) {
        self.0.lock().unwrap().shown.push(Shown::Error {
            job_id: view.job.id.clone(),
            message: message.to_string(),
        });
    }

    fn show_timeout(&mut self, view: &JobView) {
        self.0.lock().unwrap().shown.push(Shown::Timeout {
            job_id: view.job.id.clone(),
        });
    }
}

pub fn config() -> ObserverConfig {
    ObserverConfig::new(SCOPE)
}

/// Wait (in virtual time when paused) until the views satisfy `predicate`.
pub async fn wait_for_views(
    views: &mut watch::Receiver<Vec<JobView>>,
    within: Duration,
    predicate: impl FnMut(&Vec<JobView>) -> bool,
) -> Vec<JobView> {
    tokio::time::timeout(within, views.wait_for(predicate))
        .await
        .expect("views never reached the expected state")
        .expect("observer stopped")
        .clone()
}

pub fn find<'a>(views: &'a [JobView], id: &str) -> Option<&'a JobView> {
    views.iter().find(|v| v.job.id == id)
}

/// With time paused, returns once every spawned task has gone idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
