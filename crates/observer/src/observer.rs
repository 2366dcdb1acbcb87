//! The process observer.
//!
//! One serializing loop per owner scope owns every [`JobView`]. The push
//! subscription, fallback pollers, safety timers, registry reads and user
//! commands never touch that state directly; they send an [`ObserverMsg`]
//! into the loop. Terminal outcomes pass through a per-job [`ResolveOnce`],
//! so whichever channel reports first wins and result side effects run once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobwatch_types::{Job, JobEvent, ResourceDocument};

use crate::api::{JobApi, PushConnector};
use crate::config::ObserverConfig;
use crate::error::{ObserverError, ObserverResult};
use crate::poller::{spawn_fallback_poller, PollOutcome, PollSchedule};
use crate::stream::{spawn_push_subscription, PushMessage};
use crate::terminal::{ResolveOnce, TerminalEvent};
use crate::view::{sort_views, JobView};

/// Shown when a job completed but its result could not be loaded.
pub const FETCH_FAILURE: &str = "The result could not be loaded.";

/// Where the observer sends what the user should see. Called only from the
/// observer loop, never concurrently.
pub trait Presenter: Send + 'static {
    /// Every view, newest first, after any accepted change.
    fn render(&mut self, views: &[JobView]);

    /// A watched job completed and its resource was fetched.
    fn show_result(&mut self, view: &JobView, document: &ResourceDocument);

    /// A watched job failed, or its result could not be fetched.
    fn show_error(&mut self, view: &JobView, message: &str);

    /// An action plan outlived its safety timeout. The job keeps running.
    fn show_timeout(&mut self, view: &JobView);
}

#[derive(Debug)]
pub(crate) enum ObserverMsg {
    Push(PushMessage),
    Poll(PollOutcome),
    Snapshot(ObserverResult<Vec<Job>>),
    Reconcile,
    Track(Job),
    TimedOut(String),
    Fetched {
        job_id: String,
        result: ObserverResult<ResourceDocument>,
    },
    Dismiss {
        job_id: String,
        reply: oneshot::Sender<ObserverResult<()>>,
    },
    Shutdown,
}

impl From<PushMessage> for ObserverMsg {
    fn from(message: PushMessage) -> Self {
        ObserverMsg::Push(message)
    }
}

impl From<PollOutcome> for ObserverMsg {
    fn from(outcome: PollOutcome) -> Self {
        ObserverMsg::Poll(outcome)
    }
}

/// What one running observer shares with the tasks it spawns. Created when
/// the observer subscribes; cancelling its token tears every task down.
#[derive(Clone)]
pub struct ObserverContext {
    config: ObserverConfig,
    api: Arc<dyn JobApi>,
    tx: mpsc::UnboundedSender<ObserverMsg>,
    cancel: CancellationToken,
}

impl ObserverContext {
    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn owner_scope(&self) -> &str {
        &self.config.owner_scope
    }

    /// List the registry and feed the snapshot back into the loop.
    fn reconcile(&self) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let owner_scope = self.config.owner_scope.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = api.list(&owner_scope) => result,
            };
            let _ = tx.send(ObserverMsg::Snapshot(result));
        });
    }

    /// Start the per-job timers: fallback poller and safety timeout.
    fn arm(&self, job: &Job, cancel: &CancellationToken) {
        if job.job_type.uses_fallback_poll() {
            let schedule = PollSchedule {
                grace: self.config.poll_grace,
                interval: self.config.poll_interval,
            };
            spawn_fallback_poller(self.api.clone(), job, schedule, self.tx.clone(), cancel.clone());
        }

        if job.job_type.has_safety_timeout() {
            let age = (Utc::now() - job.created_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let remaining = self.config.action_plan_timeout.saturating_sub(age);
            let tx = self.tx.clone();
            let cancel = cancel.clone();
            let job_id = job.id.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(remaining) => {
                        let _ = tx.send(ObserverMsg::TimedOut(job_id));
                    }
                }
            });
        }
    }

    fn fetch_resource(&self, job: &Job) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let job_id = job.id.clone();
        let job_type = job.job_type;
        let resource_id = job.resource_key().to_string();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = api.fetch_resource(job_type, &resource_id) => result,
            };
            let _ = tx.send(ObserverMsg::Fetched { job_id, result });
        });
    }

    /// Remove the job server-side. A failure is logged; the local view is
    /// already gone either way.
    fn remove_remote(&self, job_id: String, reply: oneshot::Sender<ObserverResult<()>>) {
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(e) = api.remove(&job_id).await {
                warn!(%job_id, error = %e, "failed to dismiss job on server");
            }
            let _ = reply.send(Ok(()));
        });
    }
}

struct Tracked {
    view: JobView,
    terminal: ResolveOnce,
    /// Seen running by this observer. Only watched jobs get result side
    /// effects; a job first seen already finished is recorded silently.
    watched: bool,
    /// Stops this job's poller and timeout.
    cancel: CancellationToken,
    /// Poller and timeout started. Views built from a bare push event wait
    /// for the registry record, which carries `createdAt` and the target
    /// resource both timers depend on.
    armed: bool,
}

impl Tracked {
    fn new(view: JobView, cancel: CancellationToken) -> Self {
        let terminal = ResolveOnce::new();
        let watched = match TerminalEvent::from_job(&view.job) {
            Some(outcome) => {
                terminal.resolve(outcome);
                false
            }
            None => true,
        };
        Self {
            view,
            terminal,
            watched,
            cancel,
            armed: false,
        }
    }

    fn arm(&mut self, ctx: &ObserverContext) {
        if self.armed || !self.watched || self.terminal.is_resolved() {
            return;
        }
        ctx.arm(&self.view.job, &self.cancel);
        self.armed = true;
    }
}

/// The observer loop for one owner scope.
pub struct ProcessObserver<P> {
    ctx: ObserverContext,
    presenter: P,
    jobs: HashMap<String, Tracked>,
    /// Dismissed ids, kept until the registry stops listing them so late
    /// events and in-flight snapshots cannot bring a job back.
    dismissed: HashSet<String>,
    views_tx: watch::Sender<Vec<JobView>>,
}

impl<P: Presenter> ProcessObserver<P> {
    /// Start observing `config.owner_scope`: subscribe to push events, list
    /// the registry and run the loop until the handle shuts it down.
    pub fn spawn(
        config: ObserverConfig,
        api: Arc<dyn JobApi>,
        connector: Arc<dyn PushConnector>,
        presenter: P,
    ) -> ObserverHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (views_tx, views_rx) = watch::channel(Vec::new());
        let cancel = CancellationToken::new();

        spawn_push_subscription(
            connector,
            config.owner_scope.clone(),
            config.reconnect_delay,
            tx.clone(),
            cancel.child_token(),
        );

        let ctx = ObserverContext {
            config,
            api,
            tx: tx.clone(),
            cancel: cancel.clone(),
        };
        ctx.reconcile();
        info!(owner_scope = %ctx.owner_scope(), "observer started");

        let observer = ProcessObserver {
            ctx,
            presenter,
            jobs: HashMap::new(),
            dismissed: HashSet::new(),
            views_tx,
        };
        let task = tokio::spawn(observer.run(rx));

        ObserverHandle {
            tx,
            views: views_rx,
            cancel,
            task: Some(task),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ObserverMsg>) {
        loop {
            let msg = tokio::select! {
                _ = self.ctx.cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            if !self.handle(msg) {
                break;
            }
        }
        self.ctx.cancel.cancel();
        info!(owner_scope = %self.ctx.owner_scope(), "observer stopped");
    }

    /// Returns `false` when the loop should stop.
    fn handle(&mut self, msg: ObserverMsg) -> bool {
        match msg {
            ObserverMsg::Push(PushMessage::Connected)
            | ObserverMsg::Push(PushMessage::Resync)
            | ObserverMsg::Reconcile => self.ctx.reconcile(),
            ObserverMsg::Push(PushMessage::Event(event)) => self.on_event(event),
            ObserverMsg::Poll(outcome) => self.on_poll(outcome),
            ObserverMsg::Snapshot(Ok(jobs)) => self.on_snapshot(jobs),
            ObserverMsg::Snapshot(Err(e)) => {
                warn!(owner_scope = %self.ctx.owner_scope(), error = %e, "registry list failed")
            }
            ObserverMsg::Track(job) => self.on_track(job),
            ObserverMsg::TimedOut(job_id) => self.on_timeout(&job_id),
            ObserverMsg::Fetched { job_id, result } => self.on_fetched(&job_id, result),
            ObserverMsg::Dismiss { job_id, reply } => self.on_dismiss(job_id, reply),
            ObserverMsg::Shutdown => return false,
        }
        true
    }

    fn insert(&mut self, view: JobView, arm: bool) {
        let mut tracked = Tracked::new(view, self.ctx.cancel.child_token());
        if arm {
            tracked.arm(&self.ctx);
        }
        self.jobs.insert(tracked.view.job.id.clone(), tracked);
    }

    fn on_track(&mut self, job: Job) {
        if self.jobs.contains_key(&job.id) {
            debug!(job_id = %job.id, "job already tracked");
            return;
        }
        info!(job_id = %job.id, job_type = %job.job_type, "tracking local job");
        self.dismissed.remove(&job.id);
        self.insert(JobView::unconfirmed(job), true);
        self.render();
    }

    fn on_event(&mut self, event: JobEvent) {
        let job_id = event.job_id().to_string();
        if self.dismissed.contains(&job_id) {
            debug!(%job_id, kind = event.kind(), "ignoring push event for dismissed job");
            return;
        }
        if !self.jobs.contains_key(&job_id) {
            debug!(%job_id, kind = event.kind(), "push event for unknown job, reconciling");
            let job = Job::new(
                job_id.clone(),
                event.job_type(),
                self.ctx.owner_scope(),
                String::new(),
            );
            self.insert(JobView::confirmed(job), false);
            self.ctx.reconcile();
        }

        let Some(tracked) = self.jobs.get_mut(&job_id) else {
            return;
        };
        if tracked.view.timed_out {
            debug!(%job_id, kind = event.kind(), "ignoring push event after safety timeout");
            return;
        }

        match (&event, TerminalEvent::from_event(&event)) {
            (_, Some(outcome)) => self.resolve(&job_id, outcome, None),
            (JobEvent::Progress(progress), None) => {
                if tracked.terminal.is_resolved() {
                    debug!(%job_id, "ignoring progress for finished job");
                } else if tracked.view.apply_progress(progress, Utc::now()) {
                    self.render();
                }
            }
            (_, None) => {}
        }
    }

    fn on_poll(&mut self, outcome: PollOutcome) {
        let terminal = TerminalEvent::from_settlement(outcome.settlement, &outcome.resource_id);
        self.resolve(&outcome.job_id, terminal, None);
    }

    fn on_snapshot(&mut self, jobs: Vec<Job>) {
        let listed: HashSet<String> = jobs.iter().map(|job| job.id.clone()).collect();
        self.dismissed.retain(|id| listed.contains(id));

        let mut changed = false;
        for job in jobs {
            if self.dismissed.contains(&job.id) {
                continue;
            }
            match self.jobs.get_mut(&job.id) {
                None => {
                    changed = true;
                    self.insert(JobView::confirmed(job), true);
                }
                Some(tracked) => match TerminalEvent::from_job(&job) {
                    Some(outcome) if !tracked.terminal.is_resolved() => {
                        tracked.view.awaiting_confirmation = false;
                        self.resolve(&job.id, outcome, Some(&job));
                    }
                    _ => {
                        changed |= tracked.view.merge_snapshot(&job);
                        tracked.arm(&self.ctx);
                    }
                },
            }
        }
        if changed {
            self.render();
        }
    }

    /// Route a terminal outcome through the job's resolve-once slot. Only the
    /// first outcome for a job has any effect. A registry snapshot, when that
    /// is where the outcome came from, replaces the local record.
    fn resolve(&mut self, job_id: &str, outcome: TerminalEvent, snapshot: Option<&Job>) {
        let Some(tracked) = self.jobs.get_mut(job_id) else {
            return;
        };
        if !tracked.terminal.resolve(outcome.clone()) {
            debug!(job_id, "terminal state already observed, ignoring");
            return;
        }
        tracked.cancel.cancel();
        match snapshot {
            Some(job) => tracked.view.job = job.clone(),
            None => {
                outcome.apply_to(&mut tracked.view.job, Utc::now());
            }
        }
        info!(job_id, status = ?tracked.view.job.status, "job finished");

        if tracked.watched {
            match outcome.display_message() {
                Some(message) => self.presenter.show_error(&tracked.view, message),
                None => self.ctx.fetch_resource(&tracked.view.job),
            }
        }
        self.render();
    }

    fn on_timeout(&mut self, job_id: &str) {
        let Some(tracked) = self.jobs.get_mut(job_id) else {
            return;
        };
        if tracked.terminal.is_resolved() || tracked.view.timed_out {
            return;
        }
        tracked.view.timed_out = true;
        warn!(job_id, "job still running after safety timeout");
        self.presenter.show_timeout(&tracked.view);
        self.render();
    }

    fn on_fetched(&mut self, job_id: &str, result: ObserverResult<ResourceDocument>) {
        let Some(tracked) = self.jobs.get(job_id) else {
            debug!(job_id, "job dismissed before its result arrived");
            return;
        };
        match result {
            Ok(document) => self.presenter.show_result(&tracked.view, &document),
            Err(e) => {
                warn!(job_id, error = %e, "failed to fetch finished resource");
                self.presenter.show_error(&tracked.view, FETCH_FAILURE);
            }
        }
    }

    fn on_dismiss(&mut self, job_id: String, reply: oneshot::Sender<ObserverResult<()>>) {
        match self.jobs.get(&job_id).map(|t| t.view.is_terminal()) {
            Some(false) => {
                let _ = reply.send(Err(ObserverError::NotDismissable(job_id)));
                return;
            }
            Some(true) => {
                if let Some(tracked) = self.jobs.remove(&job_id) {
                    tracked.cancel.cancel();
                }
                self.dismissed.insert(job_id.clone());
                self.render();
            }
            None => {}
        }
        self.ctx.remove_remote(job_id, reply);
    }

    fn render(&mut self) {
        let mut views: Vec<JobView> = self.jobs.values().map(|t| t.view.clone()).collect();
        sort_views(&mut views);
        self.presenter.render(&views);
        self.views_tx.send_replace(views);
    }
}

/// Control surface of a running [`ProcessObserver`]. Dropping it stops the
/// observer.
pub struct ObserverHandle {
    tx: mpsc::UnboundedSender<ObserverMsg>,
    views: watch::Receiver<Vec<JobView>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    /// Show a job this client just triggered, before the registry lists it.
    pub fn track_local(&self, job: Job) -> ObserverResult<()> {
        self.send(ObserverMsg::Track(job))
    }

    /// Re-list the registry now.
    pub fn reconcile(&self) -> ObserverResult<()> {
        self.send(ObserverMsg::Reconcile)
    }

    /// Dismiss a finished job locally and on the server.
    pub async fn dismiss(&self, job_id: &str) -> ObserverResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ObserverMsg::Dismiss {
            job_id: job_id.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| ObserverError::Closed)?
    }

    /// Current views, newest first.
    pub fn views(&self) -> Vec<JobView> {
        self.views.borrow().clone()
    }

    /// Receiver that changes whenever the observer re-renders.
    pub fn subscribe_views(&self) -> watch::Receiver<Vec<JobView>> {
        self.views.clone()
    }

    /// Stop the loop and every task it spawned. Server state is untouched.
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(ObserverMsg::Shutdown);
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "observer task failed");
            }
        }
    }

    fn send(&self, msg: ObserverMsg) -> ObserverResult<()> {
        self.tx.send(msg).map_err(|_| ObserverError::Closed)
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
