use axum::http::StatusCode;
use tracing::{error, warn};

use gudpals_sync::SyncError;

pub fn status_for(e: &SyncError) -> StatusCode {
    match e {
        SyncError::NotFound(_) => StatusCode::NOT_FOUND,
        SyncError::Duplicate(_) => StatusCode::CONFLICT,
        SyncError::Auth(_) => StatusCode::UNAUTHORIZED,
        SyncError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        SyncError::Network(_) | SyncError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log a failed service call and turn it into a response status.
pub fn reject(e: SyncError) -> StatusCode {
    let status = status_for(&e);
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected ({}): {}", status, e);
    }
    status
}
