use std::collections::HashMap;

use tracing::warn;

use gudpals_types::events::{FeedEvent, FeedFilter};
use gudpals_types::models::{Conversation, Message};

use crate::error::Result;
use crate::gateway::Gateway;
use crate::merge::MergeStore;
use crate::scope::{Scope, ScopeFeed};

const UNKNOWN_USER: &str = "Unknown User";

/// Direct messages between `user_id` and `partner_id`, both directions.
#[derive(Debug, Clone)]
pub struct ConversationScope {
    pub user_id: String,
    pub partner_id: String,
}

impl Scope for ConversationScope {
    type Item = Message;

    fn filter(&self) -> FeedFilter {
        FeedFilter::Conversation {
            user_id: self.user_id.clone(),
            partner_id: self.partner_id.clone(),
        }
    }

    async fn load<G: Gateway>(&self, gateway: &G) -> Result<Vec<Message>> {
        gateway
            .conversation_messages(&self.user_id, &self.partner_id)
            .await
    }

    fn apply(&self, store: &mut MergeStore<Message>, event: &FeedEvent) -> bool {
        match event {
            FeedEvent::MessageCreated(m) if m.is_between(&self.user_id, &self.partner_id) => {
                store.on_push(m.clone())
            }
            FeedEvent::MessagesRead {
                reader_id,
                sender_id,
                ..
            } => {
                let flipped = store.update_where(
                    |m| !m.is_read && m.sender_id == *sender_id && m.receiver_id == *reader_id,
                    |m| m.is_read = true,
                );
                flipped > 0
            }
            _ => false,
        }
    }
}

/// An open one-to-one chat as seen by `user_id`.
///
/// Messages from the partner are marked read as they are merged, the way
/// an open chat window acknowledges what it displays.
pub struct ChatRoom<G: Gateway> {
    feed: ScopeFeed<G, ConversationScope>,
}

impl<G: Gateway> ChatRoom<G> {
    pub async fn open(gateway: G, user_id: &str, partner_id: &str) -> Result<Self> {
        let scope = ConversationScope {
            user_id: user_id.to_string(),
            partner_id: partner_id.to_string(),
        };
        let mut room = Self {
            feed: ScopeFeed::open(gateway, scope).await?,
        };
        room.acknowledge().await;
        Ok(room)
    }

    pub fn user_id(&self) -> &str {
        &self.feed.scope().user_id
    }

    pub fn partner_id(&self) -> &str {
        &self.feed.scope().partner_id
    }

    pub fn messages(&self) -> &[Message] {
        self.feed.records()
    }

    pub fn unread_count(&self) -> usize {
        let me = self.user_id();
        self.messages()
            .iter()
            .filter(|m| m.receiver_id == me && !m.is_read)
            .count()
    }

    /// Send and merge the stored message immediately.
    pub async fn send(&mut self, body: &str) -> Result<Message> {
        let scope = self.feed.scope().clone();
        let message = self
            .feed
            .gateway()
            .send_message(&scope.user_id, &scope.partner_id, body)
            .await?;
        self.feed.store_mut().on_push(message.clone());
        Ok(message)
    }

    /// Apply queued pushes without waiting, then acknowledge new messages.
    pub async fn sync(&mut self) -> usize {
        let changed = self.feed.pump();
        if changed > 0 {
            self.acknowledge().await;
        }
        changed
    }

    /// Wait for the next push for this conversation.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        let event = self.feed.next().await?;
        if let FeedEvent::MessageCreated(m) = &event
            && m.receiver_id == self.user_id()
        {
            self.acknowledge().await;
        }
        Some(event)
    }

    pub async fn reload(&mut self) -> Result<()> {
        self.feed.reload().await
    }

    pub fn close(&mut self) {
        self.feed.close();
    }

    /// Mark the partner's messages read. Failures are logged; the room stays usable.
    async fn acknowledge(&mut self) {
        if self.unread_count() == 0 {
            return;
        }
        let scope = self.feed.scope().clone();
        match self
            .feed
            .gateway()
            .mark_read(&scope.user_id, &scope.partner_id)
            .await
        {
            Ok(_) => {
                self.feed.store_mut().update_where(
                    |m| m.receiver_id == scope.user_id && m.sender_id == scope.partner_id,
                    |m| m.is_read = true,
                );
            }
            Err(e) => warn!("Failed to mark messages from {} read: {}", scope.partner_id, e),
        }
    }
}

/// Group `user_id`'s messages by counterpart, newest conversation first.
pub fn conversations(user_id: &str, messages: &[Message]) -> Vec<Conversation> {
    let mut by_partner: HashMap<&str, Conversation> = HashMap::new();

    for m in messages {
        let partner = m.counterpart(user_id);
        let unread = usize::from(m.receiver_id == user_id && !m.is_read);

        match by_partner.get_mut(partner) {
            Some(c) => {
                if m.created_at > c.last_message_at {
                    c.last_message = m.body.clone();
                    c.last_message_at = m.created_at;
                }
                c.unread_count += unread;
            }
            None => {
                by_partner.insert(
                    partner,
                    Conversation {
                        counterpart_id: partner.to_string(),
                        display_name: None,
                        last_message: m.body.clone(),
                        last_message_at: m.created_at,
                        unread_count: unread,
                    },
                );
            }
        }
    }

    let mut list: Vec<Conversation> = by_partner.into_values().collect();
    list.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then_with(|| a.counterpart_id.cmp(&b.counterpart_id))
    });
    list
}

/// Conversation list for `user_id` with counterpart display names.
pub async fn inbox<G: Gateway>(gateway: &G, user_id: &str) -> Result<Vec<Conversation>> {
    let messages = gateway.messages_for_user(user_id).await?;
    let mut list = conversations(user_id, &messages);

    for c in &mut list {
        let name = match gateway.profile(&c.counterpart_id).await {
            Ok(Some(profile)) => profile.display_name,
            Ok(None) => UNKNOWN_USER.to_string(),
            Err(e) => {
                warn!("Profile lookup for {} failed: {}", c.counterpart_id, e);
                UNKNOWN_USER.to_string()
            }
        };
        c.display_name = Some(name);
    }
    Ok(list)
}
