use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use gudpals_sync::reminders::run_sweep;

use crate::auth::AppState;
use crate::error::reject;

/// Run one reminder sweep now, outside the server's interval.
pub async fn run_reminders(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let summary = run_sweep(&state.gateway, Utc::now()).await.map_err(reject)?;
    Ok(Json(summary))
}
