use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use gudpals_sync::Gateway;
use gudpals_types::api::Claims;

use crate::auth::AppState;
use crate::error::reject;

pub async fn get_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let activity = state.gateway.activity(activity_id).await.map_err(reject)?;
    Ok(Json(activity))
}

/// Put the activity on air. The response carries the host token, which is
/// never stored.
pub async fn start_live(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let started = state.gateway.start_live(activity_id).await.map_err(reject)?;
    info!("{} started live session for {}", claims.sub, activity_id);
    Ok(Json(started))
}

pub async fn stop_live(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let stopped = state.gateway.stop_live(activity_id).await.map_err(reject)?;
    info!("{} stopped live session for {}", claims.sub, activity_id);
    Ok(Json(stopped))
}
