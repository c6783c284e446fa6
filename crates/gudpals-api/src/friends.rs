use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use gudpals_types::api::{Claims, FriendRequestCreate};

use crate::auth::AppState;
use crate::error::reject;

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FriendRequestCreate>,
) -> Result<impl IntoResponse, StatusCode> {
    let request = state
        .gateway
        .send_friend_request(&claims.sub, &req.receiver_id, req.message)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Pending requests addressed to the caller.
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let requests = state
        .gateway
        .pending_friend_requests(&claims.sub)
        .await
        .map_err(reject)?;
    Ok(Json(requests))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let connection = state
        .gateway
        .accept_friend_request(request_id, &claims.sub)
        .await
        .map_err(reject)?;
    Ok(Json(connection))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let request = state
        .gateway
        .reject_friend_request(request_id, &claims.sub)
        .await
        .map_err(reject)?;
    Ok(Json(request))
}

pub async fn list_connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let connections = state
        .gateway
        .connections(&claims.sub)
        .await
        .map_err(reject)?;
    Ok(Json(connections))
}
