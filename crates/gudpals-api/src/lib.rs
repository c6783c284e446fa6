pub mod activities;
pub mod auth;
pub mod checkout;
pub mod error;
pub mod feed;
pub mod friends;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod profiles;
pub mod registrations;
pub mod reminders;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use auth::{AppState, AppStateInner};

/// Every route the server exposes. `/health` and `/feed` authenticate on
/// their own; everything else sits behind the bearer middleware.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/feed", get(feed::ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/messages", get(messages::get_conversation).post(messages::send_message))
        .route("/messages/inbox", get(messages::get_inbox))
        .route("/messages/read", post(messages::mark_read))
        .route(
            "/sessions/{session_id}/chat",
            get(messages::get_session_chat).post(messages::send_session_chat),
        )
        .route(
            "/activities/{activity_id}/registration",
            get(registrations::get_registration)
                .post(registrations::register)
                .delete(registrations::unregister),
        )
        .route(
            "/registrations",
            get(registrations::list_registrations).post(registrations::insert_registration),
        )
        .route("/activities/{activity_id}", get(activities::get_activity))
        .route("/activities/{activity_id}/live/start", post(activities::start_live))
        .route("/activities/{activity_id}/live/stop", post(activities::stop_live))
        .route("/profile/sync", post(profiles::sync_profile))
        .route("/profiles/{user_id}", get(profiles::get_profile))
        .route(
            "/friends/requests",
            get(friends::list_requests).post(friends::send_request),
        )
        .route("/friends/requests/{request_id}/accept", post(friends::accept_request))
        .route("/friends/requests/{request_id}/reject", post(friends::reject_request))
        .route("/friends", get(friends::list_connections))
        .route(
            "/notifications",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/checkout", post(checkout::create_checkout))
        .route("/reminders/run", post(reminders::run_reminders))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> &'static str {
    "ok"
}
