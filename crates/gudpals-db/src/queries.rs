use chrono::{DateTime, Utc};
use rusqlite::{Connection as SqlConnection, Row, params};
use uuid::Uuid;

use gudpals_types::models::{
    Activity, Connection, FriendRequest, FriendRequestStatus, LiveSessionState, Message,
    Notification, Order, Product, Profile, Registration, SessionChat,
};

use crate::models::{
    ActivityRow, ConnectionRow, FriendRequestRow, MessageRow, NotificationRow, OrderRow,
    ProductRow, ProfileRow, RegistrationRow, SessionChatRow, format_ts,
};
use crate::{Database, DbError, Result};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, body, is_read, created_at";
const REGISTRATION_COLUMNS: &str = "id, user_id, activity_id, registered_at";
const ACTIVITY_COLUMNS: &str = "id, title, starts_at, is_live, channel_name, channel_token";
const PROFILE_COLUMNS: &str = "id, display_name, email, phone_number, photo_url, last_login_at";
const FRIEND_REQUEST_COLUMNS: &str = "id, sender_id, receiver_id, message, status, created_at";
const CONNECTION_COLUMNS: &str = "id, user_a, user_b, created_at";
const NOTIFICATION_COLUMNS: &str =
    "id, user_id, title, body, kind, action_url, is_read, deliver_at";

impl Database {
    // -- Profiles --

    pub fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1");
            conn.query_row(&sql, [id], profile_row).optional()?.map(Profile::try_from).transpose()
        })
    }

    pub fn insert_profile(&self, profile: &Profile) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, display_name, email, phone_number, photo_url, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    profile.id,
                    profile.display_name,
                    profile.email,
                    profile.phone_number,
                    profile.photo_url,
                    profile.last_login_at.map(format_ts),
                ],
            )?;
            Ok(())
        })
    }

    /// Overwrite every mirrored field. Returns the number of rows touched.
    pub fn update_profile(&self, profile: &Profile) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE profiles
                 SET display_name = ?2, email = ?3, phone_number = ?4, photo_url = ?5, last_login_at = ?6
                 WHERE id = ?1",
                params![
                    profile.id,
                    profile.display_name,
                    profile.email,
                    profile.phone_number,
                    profile.photo_url,
                    profile.last_login_at.map(format_ts),
                ],
            )?;
            Ok(n)
        })
    }

    // -- Activities --

    pub fn insert_activity(&self, activity: &Activity) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO activities (id, title, starts_at, is_live, channel_name, channel_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    activity.id.to_string(),
                    activity.title,
                    activity.starts_at.map(format_ts),
                    activity.live.is_live,
                    activity.live.channel_name,
                    activity.live.channel_token,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_activity(&self, id: Uuid) -> Result<Option<Activity>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1");
            conn.query_row(&sql, [id.to_string()], activity_row)
                .optional()?
                .map(Activity::try_from)
                .transpose()
        })
    }

    pub fn set_live_state(&self, id: Uuid, state: &LiveSessionState) -> Result<()> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE activities SET is_live = ?2, channel_name = ?3, channel_token = ?4 WHERE id = ?1",
                params![id.to_string(), state.is_live, state.channel_name, state.channel_token],
            )?;
            if n == 0 {
                return Err(DbError::NotFound(format!("activity {}", id)));
            }
            Ok(())
        })
    }

    /// Activities starting in `[from, to]` that have at least one registration,
    /// each paired with its registered user ids.
    pub fn activities_with_registrants(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(Activity, Vec<String>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.title, a.starts_at, a.is_live, a.channel_name, a.channel_token, r.user_id
                 FROM activities a
                 JOIN registrations r ON r.activity_id = a.id
                 WHERE a.starts_at >= ?1 AND a.starts_at <= ?2
                 ORDER BY a.starts_at, a.id, r.registered_at",
            )?;

            let rows = stmt
                .query_map(params![format_ts(from), format_ts(to)], |row| {
                    Ok((activity_row(row)?, row.get::<_, String>(6)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut grouped: Vec<(Activity, Vec<String>)> = Vec::new();
            for (raw, user_id) in rows {
                let activity = Activity::try_from(raw)?;
                match grouped.last_mut() {
                    Some((last, users)) if last.id == activity.id => users.push(user_id),
                    _ => grouped.push((activity, vec![user_id])),
                }
            }
            Ok(grouped)
        })
    }

    // -- Reminders --

    /// Record that `window`'s reminder for this registrant is being sent.
    /// `false` when it was already recorded.
    pub fn claim_reminder(
        &self,
        activity_id: Uuid,
        user_id: &str,
        window: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO reminders_sent (activity_id, user_id, lead_window, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![activity_id.to_string(), user_id, window, format_ts(at)],
            )?;
            Ok(n == 1)
        })
    }

    /// Forget a claim whose notification could not be stored, so a later sweep retries.
    pub fn release_reminder(&self, activity_id: Uuid, user_id: &str, window: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM reminders_sent WHERE activity_id = ?1 AND user_id = ?2 AND lead_window = ?3",
                params![activity_id.to_string(), user_id, window],
            )?;
            Ok(n)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, body, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.sender_id,
                    message.receiver_id,
                    message.body,
                    message.is_read,
                    format_ts(message.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Both directions between `a` and `b`, oldest first.
    pub fn conversation_messages(&self, a: &str, b: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([a, b], message_row)?;
            collect(rows)
        })
    }

    /// Every message the user sent or received, newest first.
    pub fn messages_for_user(&self, user_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE sender_id = ?1 OR receiver_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([user_id], message_row)?;
            collect(rows)
        })
    }

    /// Flip `is_read` on unread messages from `sender_id` to `reader_id`.
    pub fn mark_read(&self, reader_id: &str, sender_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                [sender_id, reader_id],
            )?;
            Ok(n)
        })
    }

    // -- Session chat --

    /// Insert a chat line and read it back joined with the author's display name.
    pub fn insert_session_chat(
        &self,
        id: Uuid,
        session_id: Uuid,
        user_id: &str,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> Result<SessionChat> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_chats (id, session_id, user_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), session_id.to_string(), user_id, body, format_ts(created_at)],
            )?;
            query_session_chat(conn, "c.id = ?1", &id.to_string())?
                .pop()
                .ok_or_else(|| DbError::NotFound(format!("session chat {}", id)))
        })
    }

    pub fn session_chat(&self, session_id: Uuid) -> Result<Vec<SessionChat>> {
        self.with_conn(|conn| query_session_chat(conn, "c.session_id = ?1", &session_id.to_string()))
    }

    // -- Registrations --

    pub fn find_registration(&self, user_id: &str, activity_id: Uuid) -> Result<Option<Registration>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations
                 WHERE user_id = ?1 AND activity_id = ?2
                 ORDER BY registered_at ASC LIMIT 1"
            );
            conn.query_row(&sql, params![user_id, activity_id.to_string()], registration_row)
                .optional()?
                .map(Registration::try_from)
                .transpose()
        })
    }

    pub fn insert_registration(&self, registration: &Registration) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO registrations (id, user_id, activity_id, registered_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    registration.id.to_string(),
                    registration.user_id,
                    registration.activity_id.to_string(),
                    format_ts(registration.registered_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Remove every registration for the pair. Returns how many were removed.
    pub fn delete_registration(&self, user_id: &str, activity_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM registrations WHERE user_id = ?1 AND activity_id = ?2",
                params![user_id, activity_id.to_string()],
            )?;
            Ok(n)
        })
    }

    pub fn count_registrations(&self, user_id: &str, activity_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM registrations WHERE user_id = ?1 AND activity_id = ?2",
                params![user_id, activity_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(n as usize)
        })
    }

    pub fn registrations_for_user(&self, user_id: &str) -> Result<Vec<Registration>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations
                 WHERE user_id = ?1 ORDER BY registered_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([user_id], registration_row)?;
            collect(rows)
        })
    }

    // -- Friends --

    pub fn insert_friend_request(&self, request: &FriendRequest) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friend_requests (id, sender_id, receiver_id, message, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    request.id.to_string(),
                    request.sender_id,
                    request.receiver_id,
                    request.message,
                    request.status.as_str(),
                    format_ts(request.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn pending_friend_requests(&self, receiver_id: &str) -> Result<Vec<FriendRequest>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {FRIEND_REQUEST_COLUMNS} FROM friend_requests
                 WHERE receiver_id = ?1 AND status = 'pending'
                 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([receiver_id], friend_request_row)?;
            collect(rows)
        })
    }

    /// Accept a pending request addressed to `receiver_id` and record the
    /// connection, atomically.
    pub fn accept_friend_request(
        &self,
        request_id: Uuid,
        receiver_id: &str,
        connection_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(FriendRequest, Connection)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let request = set_request_status(&tx, request_id, receiver_id, FriendRequestStatus::Accepted)?;

            // Stored as an ordered pair so A→B and B→A share one row
            let (a, b) = if request.sender_id <= request.receiver_id {
                (&request.sender_id, &request.receiver_id)
            } else {
                (&request.receiver_id, &request.sender_id)
            };
            tx.execute(
                "INSERT OR IGNORE INTO connections (id, user_a, user_b, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![connection_id.to_string(), a, b, format_ts(now)],
            )?;
            let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE user_a = ?1 AND user_b = ?2");
            let connection = Connection::try_from(tx.query_row(&sql, [a, b], connection_row)?)?;

            tx.commit()?;
            Ok((request, connection))
        })
    }

    pub fn reject_friend_request(&self, request_id: Uuid, receiver_id: &str) -> Result<FriendRequest> {
        self.with_conn(|conn| set_request_status(conn, request_id, receiver_id, FriendRequestStatus::Rejected))
    }

    pub fn connections_for(&self, user_id: &str) -> Result<Vec<Connection>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections
                 WHERE user_a = ?1 OR user_b = ?1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([user_id], connection_row)?;
            collect(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, title, body, kind, action_url, is_read, deliver_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    notification.id.to_string(),
                    notification.user_id,
                    notification.title,
                    notification.body,
                    notification.kind.as_str(),
                    notification.action_url,
                    notification.is_read,
                    format_ts(notification.deliver_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Notifications whose delivery time has passed, newest first.
    pub fn delivered_notifications(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 AND deliver_at <= ?2
                 ORDER BY deliver_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id, format_ts(now)], notification_row)?;
            collect(rows)
        })
    }

    /// Every notification for the user including future reminders.
    pub fn all_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 ORDER BY deliver_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([user_id], notification_row)?;
            collect(rows)
        })
    }

    pub fn mark_notification_read(&self, id: Uuid, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id],
            )?;
            Ok(n)
        })
    }

    // -- Store --

    pub fn insert_product(&self, product: &Product) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO products (id, name, price_cents) VALUES (?1, ?2, ?3)",
                params![product.id.to_string(), product.name, product.price_cents],
            )?;
            Ok(())
        })
    }

    pub fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, price_cents FROM products WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(ProductRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        price_cents: row.get(2)?,
                    })
                },
            )
            .optional()?
            .map(Product::try_from)
            .transpose()
        })
    }

    pub fn insert_order(&self, order: &Order) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO orders (id, user_id, total_cents, checkout_session_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    order.id.to_string(),
                    order.user_id,
                    order.total_cents,
                    order.checkout_session_id,
                    order.status,
                    format_ts(order.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, total_cents, checkout_session_id, status, created_at
                 FROM orders WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([user_id], |row| {
                Ok(OrderRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    total_cents: row.get(2)?,
                    checkout_session_id: row.get(3)?,
                    status: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?;
            collect(rows)
        })
    }
}

fn set_request_status(
    conn: &SqlConnection,
    request_id: Uuid,
    receiver_id: &str,
    status: FriendRequestStatus,
) -> Result<FriendRequest> {
    let n = conn.execute(
        "UPDATE friend_requests SET status = ?1
         WHERE id = ?2 AND receiver_id = ?3 AND status = 'pending'",
        params![status.as_str(), request_id.to_string(), receiver_id],
    )?;
    if n == 0 {
        return Err(DbError::NotFound(format!("pending friend request {}", request_id)));
    }
    let sql = format!("SELECT {FRIEND_REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1");
    FriendRequest::try_from(conn.query_row(&sql, [request_id.to_string()], friend_request_row)?)
}

fn query_session_chat(conn: &SqlConnection, predicate: &str, value: &str) -> Result<Vec<SessionChat>> {
    // JOIN profiles to fetch the author's display name in the same query
    let sql = format!(
        "SELECT c.id, c.session_id, c.user_id, p.display_name, c.body, c.created_at
         FROM session_chats c
         LEFT JOIN profiles p ON p.id = c.user_id
         WHERE {predicate}
         ORDER BY c.created_at ASC, c.rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([value], |row| {
        Ok(SessionChatRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            user_id: row.get(2)?,
            author_name: row.get(3)?,
            body: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    collect(rows)
}

fn collect<R, T>(rows: impl Iterator<Item = rusqlite::Result<R>>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.map(|row| T::try_from(row?)).collect()
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        body: row.get(3)?,
        is_read: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn registration_row(row: &Row<'_>) -> rusqlite::Result<RegistrationRow> {
    Ok(RegistrationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        activity_id: row.get(2)?,
        registered_at: row.get(3)?,
    })
}

fn activity_row(row: &Row<'_>) -> rusqlite::Result<ActivityRow> {
    Ok(ActivityRow {
        id: row.get(0)?,
        title: row.get(1)?,
        starts_at: row.get(2)?,
        is_live: row.get(3)?,
        channel_name: row.get(4)?,
        channel_token: row.get(5)?,
    })
}

fn profile_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        phone_number: row.get(3)?,
        photo_url: row.get(4)?,
        last_login_at: row.get(5)?,
    })
}

fn friend_request_row(row: &Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        message: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn connection_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRow> {
    Ok(ConnectionRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn notification_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        kind: row.get(4)?,
        action_url: row.get(5)?,
        is_read: row.get(6)?,
        deliver_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
