//! Push subscription: keeps one SSE connection per owner scope alive,
//! reconnecting after a fixed delay for as long as the observer runs.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobwatch_types::{JobEvent, RESYNC_EVENT};

use crate::api::PushConnector;

/// What the subscription reports to the observer loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// A (re)connect succeeded; events may have been missed before it.
    Connected,
    Event(JobEvent),
    /// The server dropped events for this subscriber.
    Resync,
}

/// Spawn the subscription task. It stops when `cancel` fires or `tx` closes.
pub fn spawn_push_subscription<M>(
    connector: Arc<dyn PushConnector>,
    owner_scope: String,
    reconnect_delay: Duration,
    tx: mpsc::UnboundedSender<M>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    M: From<PushMessage> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match connector.connect(&owner_scope).await {
                Ok(mut events) => {
                    info!(%owner_scope, "push stream connected");
                    if tx.send(PushMessage::Connected.into()).is_err() {
                        return;
                    }
                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => return,
                            next = events.next() => next,
                        };
                        let message = match next {
                            Some(Ok(raw)) if raw.event == RESYNC_EVENT => PushMessage::Resync,
                            Some(Ok(raw)) => match JobEvent::decode(&raw.event, &raw.data) {
                                Ok(event) => PushMessage::Event(event),
                                Err(e) => {
                                    debug!(error = %e, "discarding malformed push event");
                                    continue;
                                }
                            },
                            Some(Err(e)) => {
                                warn!(%owner_scope, error = %e, "push stream failed");
                                break;
                            }
                            None => {
                                warn!(%owner_scope, "push stream closed by server");
                                break;
                            }
                        };
                        if tx.send(message.into()).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        %owner_scope,
                        retry_secs = reconnect_delay.as_secs(),
                        error = %e,
                        "push connect failed"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(reconnect_delay) => {}
            }
        }
    })
}
