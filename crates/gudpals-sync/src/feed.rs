use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use gudpals_types::events::{FeedEvent, FeedFilter};

/// A filtered push feed delivered as a queue the owner drains.
///
/// A background task moves matching events into the queue. Releasing the
/// subscription (explicitly or on drop) stops that task, so nothing is
/// delivered into a store whose owner has gone away.
pub struct Subscription {
    filter: FeedFilter,
    rx: mpsc::UnboundedReceiver<FeedEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(filter: FeedFilter, rx: mpsc::UnboundedReceiver<FeedEvent>, task: JoinHandle<()>) -> Self {
        debug!("Subscribed to {:?}", filter);
        Self {
            filter,
            rx,
            task: Some(task),
        }
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    /// Wait for the next event. `None` once released or the feed has closed.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        if self.task.is_none() {
            return None;
        }
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        if self.task.is_none() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stop delivery and discard anything still queued. Safe to call twice.
    pub fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.rx.close();
            while self.rx.try_recv().is_ok() {}
            debug!("Released subscription {:?}", self.filter);
        }
    }

    pub fn is_released(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
