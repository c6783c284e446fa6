use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use gudpals_sync::{Gateway, inbox};
use gudpals_types::api::{
    Claims, ConversationQuery, MarkReadRequest, MarkReadResponse, SendMessageRequest,
    SessionChatRequest,
};

use crate::auth::AppState;
use crate::error::reject;

/// Both directions of the caller's conversation with `partner`, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ConversationQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = state
        .gateway
        .conversation_messages(&claims.sub, &query.partner)
        .await
        .map_err(reject)?;
    Ok(Json(messages))
}

/// Conversation list: one entry per counterpart, newest first.
pub async fn get_inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let list = inbox(&state.gateway, &claims.sub).await.map_err(reject)?;
    Ok(Json(list))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .gateway
        .send_message(&claims.sub, &req.receiver_id, &req.body)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let updated = state
        .gateway
        .mark_read(&claims.sub, &req.sender_id)
        .await
        .map_err(reject)?;
    Ok(Json(MarkReadResponse { updated }))
}

pub async fn get_session_chat(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state
        .gateway
        .session_chat(session_id)
        .await
        .map_err(reject)?;
    Ok(Json(chat))
}

pub async fn send_session_chat(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SessionChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state
        .gateway
        .send_session_chat(session_id, &claims.sub, &req.body)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(chat)))
}
