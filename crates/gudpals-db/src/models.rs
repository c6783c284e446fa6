//! Database row types. These map directly to SQLite rows.
//!
//! Rows are read as raw columns and validated into `gudpals-types` records
//! through `TryFrom`, so a malformed id or timestamp surfaces as
//! `DbError::Corrupt` instead of leaking into application logic.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use gudpals_types::models::{
    Activity, Connection, FriendRequest, FriendRequestStatus, LiveSessionState, Message,
    Notification, NotificationKind, Order, Product, Profile, Registration, SessionChat,
};

use crate::DbError;

/// Stored timestamp format. Fixed width so text ordering matches time ordering.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(column: &'static str, raw: &str) -> Result<DateTime<Utc>, DbError> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by SQLite defaults use "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|_| DbError::Corrupt {
            column,
            value: raw.to_string(),
        })
}

pub fn parse_uuid(column: &'static str, raw: &str) -> Result<Uuid, DbError> {
    raw.parse().map_err(|_| DbError::Corrupt {
        column,
        value: raw.to_string(),
    })
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = DbError;

    fn try_from(row: MessageRow) -> Result<Self, DbError> {
        Ok(Message {
            id: parse_uuid("messages.id", &row.id)?,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            body: row.body,
            is_read: row.is_read,
            created_at: parse_ts("messages.created_at", &row.created_at)?,
        })
    }
}

pub struct SessionChatRow {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub author_name: Option<String>,
    pub body: String,
    pub created_at: String,
}

impl TryFrom<SessionChatRow> for SessionChat {
    type Error = DbError;

    fn try_from(row: SessionChatRow) -> Result<Self, DbError> {
        Ok(SessionChat {
            id: parse_uuid("session_chats.id", &row.id)?,
            session_id: parse_uuid("session_chats.session_id", &row.session_id)?,
            user_id: row.user_id,
            author_name: row.author_name,
            body: row.body,
            created_at: parse_ts("session_chats.created_at", &row.created_at)?,
        })
    }
}

pub struct RegistrationRow {
    pub id: String,
    pub user_id: String,
    pub activity_id: String,
    pub registered_at: String,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = DbError;

    fn try_from(row: RegistrationRow) -> Result<Self, DbError> {
        Ok(Registration {
            id: parse_uuid("registrations.id", &row.id)?,
            user_id: row.user_id,
            activity_id: parse_uuid("registrations.activity_id", &row.activity_id)?,
            registered_at: parse_ts("registrations.registered_at", &row.registered_at)?,
        })
    }
}

pub struct ActivityRow {
    pub id: String,
    pub title: String,
    pub starts_at: Option<String>,
    pub is_live: bool,
    pub channel_name: Option<String>,
    pub channel_token: Option<String>,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = DbError;

    fn try_from(row: ActivityRow) -> Result<Self, DbError> {
        let starts_at = match row.starts_at.as_deref() {
            Some(raw) => Some(parse_ts("activities.starts_at", raw)?),
            None => None,
        };
        Ok(Activity {
            id: parse_uuid("activities.id", &row.id)?,
            title: row.title,
            starts_at,
            live: LiveSessionState {
                is_live: row.is_live,
                channel_name: row.channel_name,
                channel_token: row.channel_token,
            },
        })
    }
}

pub struct ProfileRow {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub last_login_at: Option<String>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = DbError;

    fn try_from(row: ProfileRow) -> Result<Self, DbError> {
        let last_login_at = match row.last_login_at.as_deref() {
            Some(raw) => Some(parse_ts("profiles.last_login_at", raw)?),
            None => None,
        };
        Ok(Profile {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
            phone_number: row.phone_number,
            photo_url: row.photo_url,
            last_login_at,
        })
    }
}

pub struct FriendRequestRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl TryFrom<FriendRequestRow> for FriendRequest {
    type Error = DbError;

    fn try_from(row: FriendRequestRow) -> Result<Self, DbError> {
        let status = FriendRequestStatus::parse(&row.status).ok_or(DbError::Corrupt {
            column: "friend_requests.status",
            value: row.status.clone(),
        })?;
        Ok(FriendRequest {
            id: parse_uuid("friend_requests.id", &row.id)?,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            message: row.message,
            status,
            created_at: parse_ts("friend_requests.created_at", &row.created_at)?,
        })
    }
}

pub struct ConnectionRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub created_at: String,
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = DbError;

    fn try_from(row: ConnectionRow) -> Result<Self, DbError> {
        Ok(Connection {
            id: parse_uuid("connections.id", &row.id)?,
            user_a: row.user_a,
            user_b: row.user_b,
            created_at: parse_ts("connections.created_at", &row.created_at)?,
        })
    }
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub deliver_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DbError;

    fn try_from(row: NotificationRow) -> Result<Self, DbError> {
        let kind = NotificationKind::parse(&row.kind).ok_or(DbError::Corrupt {
            column: "notifications.kind",
            value: row.kind.clone(),
        })?;
        Ok(Notification {
            id: parse_uuid("notifications.id", &row.id)?,
            user_id: row.user_id,
            title: row.title,
            body: row.body,
            kind,
            action_url: row.action_url,
            is_read: row.is_read,
            deliver_at: parse_ts("notifications.deliver_at", &row.deliver_at)?,
        })
    }
}

pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, DbError> {
        Ok(Product {
            id: parse_uuid("products.id", &row.id)?,
            name: row.name,
            price_cents: row.price_cents,
        })
    }
}

pub struct OrderRow {
    pub id: String,
    pub user_id: String,
    pub total_cents: i64,
    pub checkout_session_id: String,
    pub status: String,
    pub created_at: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, DbError> {
        Ok(Order {
            id: parse_uuid("orders.id", &row.id)?,
            user_id: row.user_id,
            total_cents: row.total_cents,
            checkout_session_id: row.checkout_session_id,
            status: row.status,
            created_at: parse_ts("orders.created_at", &row.created_at)?,
        })
    }
}
