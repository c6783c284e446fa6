use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gudpals_types::events::{FeedEvent, FeedFilter};

const BROADCAST_CAPACITY: usize = 1024;

/// Fans committed-write events out to every feed subscriber.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// All subscribers receive all events; filtering happens per subscriber
    broadcast_tx: broadcast::Sender<FeedEvent>,

    /// Forwarders currently alive, for diagnostics
    forwarders: AtomicUsize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                forwarders: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to every event. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all subscribers. Events sent with no
    /// subscribers attached are dropped.
    pub fn broadcast(&self, event: FeedEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Spawn a task forwarding events that match `filter` into `tx`.
    ///
    /// The task ends when the receiving side of `tx` is dropped, when the
    /// dispatcher shuts down, or when the returned handle is aborted.
    pub fn forward(&self, filter: FeedFilter, tx: mpsc::UnboundedSender<FeedEvent>) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        let inner = self.inner.clone();
        inner.forwarders.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let _guard = ForwarderGuard(inner);
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Feed forwarder for {:?} lagged by {} events", filter, n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if filter.matches(&event) && tx.send(event).is_err() {
                    debug!("Feed forwarder for {:?} lost its receiver", filter);
                    break;
                }
            }
        })
    }

    pub fn forwarder_count(&self) -> usize {
        self.inner.forwarders.load(Ordering::Relaxed)
    }
}

struct ForwarderGuard(Arc<DispatcherInner>);

impl Drop for ForwarderGuard {
    fn drop(&mut self) {
        self.0.forwarders.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gudpals_types::models::SessionChat;
    use uuid::Uuid;

    fn chat(session_id: Uuid) -> FeedEvent {
        FeedEvent::SessionChatCreated(SessionChat {
            id: Uuid::new_v4(),
            session_id,
            user_id: "alice".into(),
            author_name: None,
            body: "hello".into(),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn forwards_only_matching_events() {
        let dispatcher = Dispatcher::new();
        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = dispatcher.forward(FeedFilter::SessionChat { session_id }, tx);

        dispatcher.broadcast(chat(Uuid::new_v4()));
        dispatcher.broadcast(chat(session_id));

        let got = rx.recv().await.unwrap();
        assert!(matches!(got, FeedEvent::SessionChatCreated(c) if c.session_id == session_id));
        assert!(rx.try_recv().is_err());
        handle.abort();
    }

    #[tokio::test]
    async fn forwarder_stops_when_receiver_dropped() {
        let dispatcher = Dispatcher::new();
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = dispatcher.forward(FeedFilter::SessionChat { session_id }, tx);
        assert_eq!(dispatcher.forwarder_count(), 1);

        drop(rx);
        dispatcher.broadcast(chat(session_id));
        handle.await.unwrap();
        assert_eq!(dispatcher.forwarder_count(), 0);
    }
}
