use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use gudpals_sync::Gateway;
use gudpals_types::api::{Claims, NotificationCreate, clean_body};

use crate::auth::AppState;
use crate::error::reject;

/// Delivered notifications for the caller. Scheduled reminders appear once
/// their delivery time has passed.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let notifications = state
        .gateway
        .notifications(&claims.sub, Utc::now())
        .await
        .map_err(reject)?;
    Ok(Json(notifications))
}

pub async fn create_notification(
    State(state): State<AppState>,
    Json(req): Json<NotificationCreate>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.user_id.is_empty() || clean_body(&req.title).is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let notification = state
        .gateway
        .insert_notification(req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let updated = state
        .gateway
        .mark_notification_read(notification_id, &claims.sub)
        .await
        .map_err(reject)?;
    if updated == 0 {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(StatusCode::NO_CONTENT)
}
