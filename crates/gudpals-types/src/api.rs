use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{LiveSessionState, NotificationKind};

/// Trim a user-entered text body. Blank input yields `None`.
pub fn clean_body(body: &str) -> Option<&str> {
    let trimmed = body.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

// -- JWT Claims --

/// Session claims issued for the identity provider's user. Shared by the
/// REST middleware and the feed WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Opaque identity provider user id
    pub sub: String,
    pub name: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub partner: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub sender_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Session chat --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionChatRequest {
    pub body: String,
}

// -- Registrations --

/// Body of the plain insert route. Creates a row even when one exists.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationCreate {
    pub activity_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemovedResponse {
    pub removed: usize,
}

// -- Live sessions --

/// Returned to the host only. `state.channel_token` is the audience token
/// stored on the activity; `host_token` additionally permits publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStartResponse {
    pub state: LiveSessionState,
    pub host_token: String,
}

// -- Profiles --

/// Identity provider fields mirrored into the local profile on sign-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub image_url: Option<String>,
}

impl IdentityProfile {
    /// Full name, then first name, username, email, and finally "User".
    pub fn display_name(&self) -> String {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        match (present(&self.first_name), present(&self.last_name)) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.to_string(),
            _ => present(&self.username)
                .or_else(|| present(&self.email))
                .unwrap_or("User")
                .to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileSyncResponse {
    /// True when the profile row did not exist before this sync
    pub created: bool,
}

// -- Friends --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FriendRequestCreate {
    pub receiver_id: String,
    pub message: Option<String>,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationCreate {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub action_url: Option<String>,
    /// Defaults to now when absent
    pub deliver_at: Option<DateTime<Utc>>,
}

// -- Checkout --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub order_id: Uuid,
}

// -- Reminders --

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSweepResponse {
    pub events_checked: usize,
    pub notifications_sent: usize,
}
