use rusqlite::ErrorCode;
use thiserror::Error;

const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate row: {0}")]
    Duplicate(String),

    /// A stored value failed validation on the way out
    #[error("corrupt {column} '{value}'")]
    Corrupt { column: &'static str, value: String },

    #[error("database lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, ref msg) = e {
            if failure.code == ErrorCode::ConstraintViolation {
                let detail = msg.clone().unwrap_or_default();
                match failure.extended_code {
                    SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => {
                        return Self::Duplicate(detail);
                    }
                    SQLITE_CONSTRAINT_FOREIGNKEY => return Self::NotFound("referenced row".into()),
                    _ => {}
                }
            }
        }
        Self::Sqlite(e)
    }
}
