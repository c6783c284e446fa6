pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

pub use error::DbError;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub type Result<T> = std::result::Result<T, DbError>;

/// Store-level switches applied at open time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbOptions {
    /// Add a unique index on `registrations(user_id, activity_id)`.
    /// Off by default: registrations are deduplicated only by the client's
    /// check-then-insert, which leaves a race window.
    pub unique_registrations: bool,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path, options: DbOptions) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn, options)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory(options: DbOptions) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, options)
    }

    fn init(conn: Connection, options: DbOptions) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn, options)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        f(&mut conn)
    }
}
