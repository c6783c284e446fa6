use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A direct message between two users.
///
/// Immutable once created except for `is_read`, which only the receiver flips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The other participant from `user_id`'s point of view.
    pub fn counterpart(&self, user_id: &str) -> &str {
        if self.sender_id == user_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }

    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

/// A chat line posted into a live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionChat {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: String,
    pub author_name: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub user_id: String,
    pub activity_id: Uuid,
    pub registered_at: DateTime<Utc>,
}

/// Broadcast state attached to an activity while its host is on air.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSessionState {
    pub is_live: bool,
    pub channel_name: Option<String>,
    pub channel_token: Option<String>,
}

impl LiveSessionState {
    pub fn live(channel_name: String, channel_token: String) -> Self {
        Self {
            is_live: true,
            channel_name: Some(channel_name),
            channel_token: Some(channel_token),
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    /// Channel and token, only when both are present and the session is live.
    pub fn join_target(&self) -> Option<(&str, &str)> {
        match (self.is_live, &self.channel_name, &self.channel_token) {
            (true, Some(name), Some(token)) => Some((name, token)),
            _ => None,
        }
    }
}

/// An event or session users can register for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub live: LiveSessionState,
}

/// Local mirror of the identity provider's user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: Option<String>,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}

/// An accepted friendship. Stored once per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub user_a: String,
    pub user_b: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Registration,
    Reminder,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Registration => "registration",
            Self::Reminder => "reminder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "success" => Some(Self::Success),
            "registration" => Some(Self::Registration),
            "reminder" => Some(Self::Reminder),
            _ => None,
        }
    }
}

/// A user-facing notification. Reminders are written ahead of time with a
/// future `deliver_at` and stay hidden until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub deliver_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub total_cents: i64,
    pub checkout_session_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Derived view: all messages exchanged with one counterpart.
/// Never stored, always recomputed from the message sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub counterpart_id: String,
    pub display_name: Option<String>,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: usize,
}
