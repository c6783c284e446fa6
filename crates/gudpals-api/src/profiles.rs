use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use gudpals_sync::Gateway;
use gudpals_types::api::{Claims, IdentityProfile, ProfileSyncResponse};

use crate::auth::AppState;
use crate::error::reject;

/// Mirror the identity provider's record for the caller.
pub async fn sync_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(identity): Json<IdentityProfile>,
) -> Result<impl IntoResponse, StatusCode> {
    let created = state
        .gateway
        .sync_profile(&claims.sub, &identity)
        .await
        .map_err(reject)?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ProfileSyncResponse { created })))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let profile = state
        .gateway
        .profile(&user_id)
        .await
        .map_err(reject)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(profile))
}
