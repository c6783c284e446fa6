use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use gudpals_sync::{Gateway, LocalGateway, RegistrationOutcome, RegistrationWriter};
use gudpals_types::api::{Claims, RegistrationCreate, RemovedResponse};

use crate::auth::AppState;
use crate::error::reject;

fn writer(state: &AppState) -> RegistrationWriter<LocalGateway> {
    RegistrationWriter::new(state.gateway.clone())
}

/// The caller's registration for the activity, or `null`.
pub async fn get_registration(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let registration = state
        .gateway
        .find_registration(&claims.sub, activity_id)
        .await
        .map_err(reject)?;
    Ok(Json(registration))
}

/// 201 with the new registration, or 200 with the one that already existed.
pub async fn register(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let outcome = writer(&state)
        .register_once(&claims.sub, activity_id)
        .await
        .map_err(reject)?;

    let status = match outcome {
        RegistrationOutcome::Created(_) => StatusCode::CREATED,
        RegistrationOutcome::Existing(_) => StatusCode::OK,
    };
    Ok((status, Json(outcome.into_registration())))
}

/// Store one more registration row, with no existence check and no
/// notifications. Clients running their own `RegistrationWriter` insert
/// through here so the confirmation and reminders are sent once, by them.
pub async fn insert_registration(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegistrationCreate>,
) -> Result<impl IntoResponse, StatusCode> {
    let registration = state
        .gateway
        .insert_registration(&claims.sub, req.activity_id)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// Succeeds whether or not a registration existed.
pub async fn unregister(
    State(state): State<AppState>,
    Path(activity_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let removed = writer(&state)
        .unregister(&claims.sub, activity_id)
        .await
        .map_err(reject)?;
    Ok(Json(RemovedResponse { removed }))
}

pub async fn list_registrations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let registrations = writer(&state)
        .registrations(&claims.sub)
        .await
        .map_err(reject)?;
    Ok(Json(registrations))
}
