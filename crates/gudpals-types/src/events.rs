use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    FriendRequest, LiveSessionState, Message, Notification, Registration, SessionChat,
};

/// Events pushed over the realtime feed after a write has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Server confirms the feed connection is authenticated
    Ready { user_id: String },

    /// Answer to a `Subscribe`: the filters now installed. Filters the
    /// caller may not see are left out. Events committed after this frame
    /// is sent are delivered.
    Subscribed { filters: Vec<FeedFilter> },

    /// A direct message was stored
    MessageCreated(Message),

    /// `reader_id` read `count` messages sent by `sender_id`
    MessagesRead {
        reader_id: String,
        sender_id: String,
        count: usize,
    },

    /// A chat line was posted into a live session
    SessionChatCreated(SessionChat),

    RegistrationCreated(Registration),

    RegistrationDeleted { user_id: String, activity_id: Uuid },

    /// An activity went on or off air
    LiveStateChanged {
        activity_id: Uuid,
        state: LiveSessionState,
    },

    NotificationCreated(Notification),

    FriendRequestUpdated(FriendRequest),
}

/// Row-level predicate a subscriber attaches to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope")]
pub enum FeedFilter {
    /// Direct messages addressed to `receiver_id`
    Inbox { receiver_id: String },

    /// Direct messages between two users, in either direction
    Conversation { user_id: String, partner_id: String },

    SessionChat { session_id: Uuid },

    /// Registration and live-state changes of one activity
    Activity { activity_id: Uuid },

    /// Notifications and friend request updates addressed to a user
    Notifications { user_id: String },
}

impl FeedFilter {
    /// Whether `user_id` may subscribe with this filter. Direct messages and
    /// notifications are private to the user they name; session chat and
    /// activity changes are public.
    pub fn visible_to(&self, user_id: &str) -> bool {
        match self {
            Self::Inbox { receiver_id } => receiver_id == user_id,
            Self::Conversation { user_id: owner, .. } => owner == user_id,
            Self::Notifications { user_id: owner } => owner == user_id,
            Self::SessionChat { .. } | Self::Activity { .. } => true,
        }
    }

    pub fn matches(&self, event: &FeedEvent) -> bool {
        match (self, event) {
            (Self::Inbox { receiver_id }, FeedEvent::MessageCreated(m)) => {
                m.receiver_id == *receiver_id
            }
            (Self::Conversation { user_id, partner_id }, FeedEvent::MessageCreated(m)) => {
                m.is_between(user_id, partner_id)
            }
            (
                Self::Conversation { user_id, partner_id },
                FeedEvent::MessagesRead {
                    reader_id,
                    sender_id,
                    ..
                },
            ) => {
                (reader_id == user_id && sender_id == partner_id)
                    || (reader_id == partner_id && sender_id == user_id)
            }
            (Self::SessionChat { session_id }, FeedEvent::SessionChatCreated(c)) => {
                c.session_id == *session_id
            }
            (Self::Activity { activity_id }, FeedEvent::RegistrationCreated(r)) => {
                r.activity_id == *activity_id
            }
            (Self::Activity { activity_id }, FeedEvent::RegistrationDeleted { activity_id: a, .. }) => {
                a == activity_id
            }
            (Self::Activity { activity_id }, FeedEvent::LiveStateChanged { activity_id: a, .. }) => {
                a == activity_id
            }
            (Self::Notifications { user_id }, FeedEvent::NotificationCreated(n)) => {
                n.user_id == *user_id
            }
            (Self::Notifications { user_id }, FeedEvent::FriendRequestUpdated(r)) => {
                r.receiver_id == *user_id || r.sender_id == *user_id
            }
            _ => false,
        }
    }
}

/// Commands sent FROM client TO server over the feed WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedCommand {
    /// Replace this connection's filters. Events matching any filter are forwarded.
    Subscribe { filters: Vec<FeedFilter> },

    /// Drop all filters without closing the socket
    Unsubscribe,
}
