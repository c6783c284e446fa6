use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;

use gudpals_realtime::connection;

use crate::auth::AppState;
use crate::middleware::decode_claims;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub token: String,
}

/// Upgrade to the realtime feed. Browsers cannot set headers on a
/// WebSocket handshake, so the session token travels in the query.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(claims) = decode_claims(&state.jwt_secret, &query.token) else {
        warn!("Feed connection rejected: invalid token");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let dispatcher = state.gateway.dispatcher().clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, claims.sub)))
}
