use thiserror::Error;

use gudpals_db::DbError;
use gudpals_realtime::media_hub::HubError;
use gudpals_realtime::tokens::TokenError;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote call failed or could not be completed
    #[error("network error: {0}")]
    Network(String),

    /// Missing, expired, or foreign session or channel credentials
    #[error("not authorized: {0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The store rejected a second row for a single-instance key
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A record failed validation at the boundary
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("media error: {0}")]
    Media(String),
}

impl From<DbError> for SyncError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => Self::NotFound(what),
            DbError::Duplicate(detail) => Self::Duplicate(detail),
            DbError::Corrupt { column, value } => {
                Self::InvalidRecord(format!("{} = '{}'", column, value))
            }
            other => Self::Network(other.to_string()),
        }
    }
}

impl From<HubError> for SyncError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::Token(TokenError::Signing) => Self::Media(e.to_string()),
            HubError::Token(_) | HubError::RoleNotPermitted(_) => Self::Auth(e.to_string()),
            other => Self::Media(other.to_string()),
        }
    }
}

impl From<TokenError> for SyncError {
    fn from(e: TokenError) -> Self {
        Self::from(HubError::Token(e))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidRecord(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Network(e.to_string())
    }
}
