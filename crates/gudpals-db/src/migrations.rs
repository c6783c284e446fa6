use rusqlite::Connection;
use tracing::info;

use crate::{DbOptions, Result};

pub fn run(conn: &Connection, options: DbOptions) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE profiles (
                id              TEXT PRIMARY KEY,
                display_name    TEXT NOT NULL,
                email           TEXT,
                phone_number    TEXT,
                photo_url       TEXT,
                last_login_at   TEXT
            );

            CREATE TABLE activities (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                starts_at       TEXT,
                is_live         INTEGER NOT NULL DEFAULT 0,
                channel_name    TEXT,
                channel_token   TEXT
            );

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                sender_id       TEXT NOT NULL,
                receiver_id     TEXT NOT NULL,
                body            TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_receiver ON messages(receiver_id, created_at);
            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);

            CREATE TABLE session_chats (
                id              TEXT PRIMARY KEY,
                session_id      TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL,
                body            TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_session_chats_session ON session_chats(session_id, created_at);

            -- No uniqueness on (user_id, activity_id): see DbOptions::unique_registrations
            CREATE TABLE registrations (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                activity_id     TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
                registered_at   TEXT NOT NULL
            );

            CREATE INDEX idx_registrations_user ON registrations(user_id, activity_id);

            CREATE TABLE friend_requests (
                id              TEXT PRIMARY KEY,
                sender_id       TEXT NOT NULL,
                receiver_id     TEXT NOT NULL,
                message         TEXT,
                status          TEXT NOT NULL DEFAULT 'pending',
                created_at      TEXT NOT NULL
            );

            CREATE TABLE connections (
                id              TEXT PRIMARY KEY,
                user_a          TEXT NOT NULL,
                user_b          TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                UNIQUE(user_a, user_b)
            );

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                title           TEXT NOT NULL,
                body            TEXT NOT NULL,
                kind            TEXT NOT NULL,
                action_url      TEXT,
                is_read         INTEGER NOT NULL DEFAULT 0,
                deliver_at      TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, deliver_at);

            CREATE TABLE products (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                price_cents     INTEGER NOT NULL
            );

            CREATE TABLE orders (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL,
                total_cents         INTEGER NOT NULL,
                checkout_session_id TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                created_at          TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (reminder ledger)");
        conn.execute_batch(
            "
            CREATE TABLE reminders_sent (
                activity_id     TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL,
                lead_window     TEXT NOT NULL,
                sent_at         TEXT NOT NULL,
                PRIMARY KEY (activity_id, user_id, lead_window)
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    if options.unique_registrations {
        conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_registrations_user_activity
                ON registrations(user_id, activity_id);",
        )?;
        info!("Unique registration index enabled");
    }

    info!("Database migrations complete");
    Ok(())
}
