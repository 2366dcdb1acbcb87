//! Per-owner-scope fan-out of job events to connected observers.
//!
//! Delivery is at-most-once per connected observer: there is no history, and
//! an event published to a scope nobody is watching is dropped. Observers
//! list the registry to catch up after connecting.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use jobwatch_types::JobEvent;

use crate::metrics::{record_event_dropped, record_event_published, set_push_subscribers};

/// Default per-scope channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub struct ProgressBroadcaster {
    capacity: usize,
    scopes: RwLock<HashMap<String, broadcast::Sender<JobEvent>>>,
}

/// A connected observer's receiving end for one owner scope.
///
/// Dropping the last subscription of a scope releases the scope's channel.
pub struct Subscription {
    scope: String,
    rx: broadcast::Receiver<JobEvent>,
    broadcaster: Arc<ProgressBroadcaster>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    /// Connect an observer to `owner_scope`.
    pub fn subscribe(self: &Arc<Self>, owner_scope: &str) -> Subscription {
        let rx = {
            let mut scopes = self.scopes.write().unwrap_or_else(|e| {
                tracing::error!("RwLock poisoned writing scopes: {e}");
                e.into_inner()
            });
            let tx = scopes
                .entry(owner_scope.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0);
            let rx = tx.subscribe();
            set_push_subscribers(owner_scope, tx.receiver_count());
            rx
        };
        tracing::debug!(owner_scope, "observer subscribed");
        Subscription {
            scope: owner_scope.to_string(),
            rx,
            broadcaster: Arc::clone(self),
        }
    }

    /// Fan `event` out to every observer of `owner_scope`.
    ///
    /// Returns how many observers it reached; zero means it was dropped.
    pub fn publish(&self, owner_scope: &str, event: JobEvent) -> usize {
        let kind = event.kind();
        let delivered = match self.scopes.read() {
            Ok(scopes) => scopes
                .get(owner_scope)
                .and_then(|tx| tx.send(event).ok())
                .unwrap_or(0),
            Err(e) => {
                tracing::error!("RwLock poisoned reading scopes: {e}");
                0
            }
        };
        if delivered == 0 {
            tracing::debug!(owner_scope, kind, "no observers connected, event dropped");
            record_event_dropped(kind);
        } else {
            record_event_published(kind, delivered);
        }
        delivered
    }

    /// Number of observers currently connected to `owner_scope`.
    pub fn subscriber_count(&self, owner_scope: &str) -> usize {
        self.scopes
            .read()
            .ok()
            .and_then(|scopes| scopes.get(owner_scope).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }

    fn release(&self, owner_scope: &str) {
        let mut scopes = self.scopes.write().unwrap_or_else(|e| e.into_inner());
        let remaining = match scopes.get(owner_scope) {
            // The releasing receiver is still alive while this runs.
            Some(tx) => tx.receiver_count().saturating_sub(1),
            None => return,
        };
        if remaining == 0 {
            scopes.remove(owner_scope);
        }
        set_push_subscribers(owner_scope, remaining);
        tracing::debug!(owner_scope, remaining, "observer unsubscribed");
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Subscription {
    pub fn owner_scope(&self) -> &str {
        &self.scope
    }

    /// Wait for the next event. `Lagged` means events were missed and the
    /// observer should re-list.
    pub async fn recv(&mut self) -> Result<JobEvent, broadcast::error::RecvError> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<JobEvent, broadcast::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.release(&self.scope);
    }
}
