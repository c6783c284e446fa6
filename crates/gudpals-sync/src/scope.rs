use std::future::Future;

use tracing::{debug, warn};
use uuid::Uuid;

use gudpals_types::events::{FeedEvent, FeedFilter};
use gudpals_types::models::SessionChat;

use crate::error::Result;
use crate::feed::Subscription;
use crate::gateway::Gateway;
use crate::merge::{MergeStore, Record};

/// One synchronized slice of the store: how to load it, which pushes
/// belong to it, and how a push changes the local copy.
pub trait Scope: Send + Sync {
    type Item: Record + Clone + Send;

    fn filter(&self) -> FeedFilter;

    /// Full ordered history, oldest first.
    fn load<G: Gateway>(&self, gateway: &G) -> impl Future<Output = Result<Vec<Self::Item>>> + Send;

    /// Fold a matching push into the store. Returns whether anything changed.
    fn apply(&self, store: &mut MergeStore<Self::Item>, event: &FeedEvent) -> bool;
}

/// A merge store kept current by a subscription to its scope.
pub struct ScopeFeed<G: Gateway, S: Scope> {
    gateway: G,
    scope: S,
    store: MergeStore<S::Item>,
    subscription: Option<Subscription>,
}

impl<G: Gateway, S: Scope> ScopeFeed<G, S> {
    /// Subscribe, then load the history. Pushes that race the load are
    /// queued and absorbed by identity on the next pump.
    pub async fn open(gateway: G, scope: S) -> Result<Self> {
        let subscription = gateway.subscribe(scope.filter()).await?;
        let history = scope.load(&gateway).await?;

        let mut store = MergeStore::new();
        store.load_initial(history);

        let mut feed = Self {
            gateway,
            scope,
            store,
            subscription: Some(subscription),
        };
        feed.pump();
        Ok(feed)
    }

    /// Replace the local sequence with a fresh load. On failure the
    /// previous sequence is left untouched.
    pub async fn reload(&mut self) -> Result<()> {
        match self.scope.load(&self.gateway).await {
            Ok(history) => {
                self.store.load_initial(history);
                Ok(())
            }
            Err(e) => {
                warn!("Reload of {:?} failed, keeping {} records: {}", self.scope.filter(), self.store.len(), e);
                Err(e)
            }
        }
    }

    /// Apply every push already queued. Returns how many changed the store.
    pub fn pump(&mut self) -> usize {
        let Some(subscription) = self.subscription.as_mut() else {
            return 0;
        };

        let mut changed = 0;
        while let Some(event) = subscription.try_recv() {
            if self.scope.apply(&mut self.store, &event) {
                changed += 1;
            }
        }
        changed
    }

    /// Wait for the next push and apply it. `None` once closed.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        let event = self.subscription.as_mut()?.recv().await?;
        if !self.scope.apply(&mut self.store, &event) {
            debug!("Push for {:?} was already present", self.scope.filter());
        }
        Some(event)
    }

    /// Release the subscription. The loaded records stay readable.
    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.release();
        }
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn records(&self) -> &[S::Item] {
        self.store.records()
    }

    pub fn store(&self) -> &MergeStore<S::Item> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MergeStore<S::Item> {
        &mut self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }
}

/// Chat lines of one live session, posted as `user_id`.
#[derive(Debug, Clone)]
pub struct SessionChatScope {
    pub session_id: Uuid,
    pub user_id: String,
}

impl Scope for SessionChatScope {
    type Item = SessionChat;

    fn filter(&self) -> FeedFilter {
        FeedFilter::SessionChat {
            session_id: self.session_id,
        }
    }

    async fn load<G: Gateway>(&self, gateway: &G) -> Result<Vec<SessionChat>> {
        gateway.session_chat(self.session_id).await
    }

    fn apply(&self, store: &mut MergeStore<SessionChat>, event: &FeedEvent) -> bool {
        match event {
            FeedEvent::SessionChatCreated(chat) if chat.session_id == self.session_id => {
                store.on_push(chat.clone())
            }
            _ => false,
        }
    }
}

impl<G: Gateway> ScopeFeed<G, SessionChatScope> {
    /// Post a line and merge the stored copy right away. The feed echo of
    /// the same line is then a no-op.
    pub async fn post(&mut self, body: &str) -> Result<SessionChat> {
        let chat = self
            .gateway
            .send_session_chat(self.scope.session_id, &self.scope.user_id, body)
            .await?;
        self.store.on_push(chat.clone());
        Ok(chat)
    }
}
