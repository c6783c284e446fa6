use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use gudpals_api::auth::create_token;
use gudpals_api::checkout::{CheckoutSessionRequest, HostedCheckout, PaymentError, PaymentProcessor};
use gudpals_api::{AppState, AppStateInner, router};
use gudpals_db::{Database, DbOptions};
use gudpals_realtime::dispatcher::Dispatcher;
use gudpals_realtime::tokens::ChannelTokens;
use gudpals_sync::LocalGateway;
use gudpals_types::models::{Activity, LiveSessionState, Product};

const SECRET: &str = "route-test-secret";

struct FakeStripe;

impl PaymentProcessor for FakeStripe {
    fn create_checkout(&self, request: CheckoutSessionRequest) -> BoxFuture<'_, Result<HostedCheckout, PaymentError>> {
        Box::pin(async move {
            Ok(HostedCheckout {
                session_id: format!("cs_test_{}", request.user_id),
                url: "https://checkout.example/pay".into(),
            })
        })
    }
}

fn state(payments: bool) -> AppState {
    let db = Database::open_in_memory(DbOptions::default()).unwrap();
    let gateway = LocalGateway::new(Arc::new(db), Dispatcher::new(), ChannelTokens::new(SECRET, 300));
    Arc::new(AppStateInner {
        gateway,
        jwt_secret: SECRET.into(),
        payments: payments.then(|| Arc::new(FakeStripe) as Arc<dyn PaymentProcessor>),
        public_url: "https://app.example".into(),
    })
}

fn bearer(user: &str) -> String {
    let token = create_token(SECRET, user, user, Duration::hours(1)).unwrap();
    format!("Bearer {}", token)
}

async fn call(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        req = req.header(header::AUTHORIZATION, bearer(user));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn add_activity(state: &AppState, starts_in: Option<Duration>) -> Uuid {
    let activity = Activity {
        id: Uuid::new_v4(),
        title: "Garden Club".into(),
        starts_at: starts_in.map(|d| Utc::now() + d),
        live: LiveSessionState::offline(),
    };
    let id = activity.id;
    state
        .gateway
        .blocking(move |db| db.insert_activity(&activity))
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_token() {
    let app = router(state(false));
    let (status, _) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::GET, "/registrations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/registrations")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn messaging_round_trip() {
    let app = router(state(false));

    let (status, sent) = call(
        &app,
        Method::POST,
        "/messages",
        Some("alice"),
        Some(json!({ "receiver_id": "bob", "body": "  hi  " })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["body"], "hi");
    assert_eq!(sent["sender_id"], "alice");

    let (status, _) = call(
        &app,
        Method::POST,
        "/messages",
        Some("alice"),
        Some(json!({ "receiver_id": "bob", "body": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, inbox) = call(&app, Method::GET, "/messages/inbox", Some("bob"), None).await;
    assert_eq!(inbox[0]["counterpart_id"], "alice");
    assert_eq!(inbox[0]["unread_count"], 1);
    assert_eq!(inbox[0]["display_name"], "Unknown User");

    let (_, read) = call(
        &app,
        Method::POST,
        "/messages/read",
        Some("bob"),
        Some(json!({ "sender_id": "alice" })),
    )
    .await;
    assert_eq!(read["updated"], 1);

    let (_, conversation) = call(&app, Method::GET, "/messages?partner=alice", Some("bob"), None).await;
    assert_eq!(conversation.as_array().unwrap().len(), 1);
    assert_eq!(conversation[0]["is_read"], true);
}

#[tokio::test]
async fn registration_is_create_or_noop() {
    let state = state(false);
    let activity = add_activity(&state, Some(Duration::days(1) + Duration::hours(2))).await;
    let app = router(state);
    let uri = format!("/activities/{}/registration", activity);

    let (status, first) = call(&app, Method::POST, &uri, Some("ann"), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, second) = call(&app, Method::POST, &uri, Some("ann"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);

    let (_, found) = call(&app, Method::GET, &uri, Some("ann"), None).await;
    assert_eq!(found["id"], first["id"]);
    let (_, list) = call(&app, Method::GET, "/registrations", Some("ann"), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, removed) = call(&app, Method::DELETE, &uri, Some("ann"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["removed"], 1);
    let (status, removed) = call(&app, Method::DELETE, &uri, Some("ann"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["removed"], 0);

    let (_, found) = call(&app, Method::GET, &uri, Some("ann"), None).await;
    assert!(found.is_null());

    // One confirmation, however often the POST is repeated
    let (_, delivered) = call(&app, Method::GET, "/notifications", Some("ann"), None).await;
    let titles: Vec<&str> = delivered
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Registration Successful"]);
}

#[tokio::test]
async fn plain_registration_insert_has_no_side_effects() {
    let state = state(false);
    let activity = add_activity(&state, Some(Duration::days(2))).await;
    let app = router(state.clone());
    let body = json!({ "activity_id": activity });

    let (status, first) = call(&app, Method::POST, "/registrations", Some("ann"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["user_id"], "ann");
    let (status, second) = call(&app, Method::POST, "/registrations", Some("ann"), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(first["id"], second["id"]);

    let all = state
        .gateway
        .blocking(|db| db.all_notifications("ann"))
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn registering_for_missing_activity_is_not_found() {
    let app = router(state(false));
    let uri = format!("/activities/{}/registration", Uuid::new_v4());
    let (status, _) = call(&app, Method::POST, &uri, Some("ann"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn live_start_and_stop() {
    let state = state(false);
    let activity = add_activity(&state, None).await;
    let app = router(state);

    let (status, started) = call(&app, Method::POST, &format!("/activities/{}/live/start", activity), Some("host"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["state"]["is_live"], true);
    assert!(started["host_token"].is_string());

    let (_, fetched) = call(&app, Method::GET, &format!("/activities/{}", activity), Some("viewer"), None).await;
    assert_eq!(fetched["live"], started["state"]);

    let (_, stopped) = call(&app, Method::POST, &format!("/activities/{}/live/stop", activity), Some("host"), None).await;
    assert_eq!(stopped["is_live"], false);
    assert!(stopped["channel_token"].is_null());
}

#[tokio::test]
async fn profile_sync_then_lookup() {
    let app = router(state(false));
    let identity = json!({ "first_name": "Grace", "last_name": "Hopper", "email": "grace@example.com" });

    let (status, body) = call(&app, Method::POST, "/profile/sync", Some("grace"), Some(identity.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], true);
    let (status, body) = call(&app, Method::POST, "/profile/sync", Some("grace"), Some(identity)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);

    let (_, profile) = call(&app, Method::GET, "/profiles/grace", Some("anyone"), None).await;
    assert_eq!(profile["display_name"], "Grace Hopper");
    let (status, _) = call(&app, Method::GET, "/profiles/nobody", Some("anyone"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn friend_requests_and_notifications() {
    let app = router(state(false));

    let (status, request) = call(
        &app,
        Method::POST,
        "/friends/requests",
        Some("alice"),
        Some(json!({ "receiver_id": "bob", "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let accept = format!("/friends/requests/{}/accept", request["id"].as_str().unwrap());

    let (status, _) = call(&app, Method::POST, &accept, Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, pending) = call(&app, Method::GET, "/friends/requests", Some("bob"), None).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    let (status, _) = call(&app, Method::POST, &accept, Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, friends) = call(&app, Method::GET, "/friends", Some("alice"), None).await;
    assert_eq!(friends.as_array().unwrap().len(), 1);

    let (_, notes) = call(&app, Method::GET, "/notifications", Some("bob"), None).await;
    let note_id = notes[0]["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, Method::POST, &format!("/notifications/{}/read", note_id), Some("bob"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::POST, &format!("/notifications/{}/read", note_id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scheduled_notifications_stay_hidden() {
    let app = router(state(false));
    let later = Utc::now() + Duration::hours(2);
    let (status, _) = call(
        &app,
        Method::POST,
        "/notifications",
        Some("system"),
        Some(json!({
            "user_id": "ann",
            "title": "Event Reminder",
            "body": "Soon",
            "kind": "reminder",
            "action_url": null,
            "deliver_at": later,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, notes) = call(&app, Method::GET, "/notifications", Some("ann"), None).await;
    assert!(notes.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn checkout_records_pending_order() {
    let state = state(true);
    let product = Product {
        id: Uuid::new_v4(),
        name: "Large Print Crossword".into(),
        price_cents: 899,
    };
    let product_id = product.id;
    state
        .gateway
        .blocking(move |db| db.insert_product(&product))
        .await
        .unwrap();
    let app = router(state.clone());

    let (status, body) = call(
        &app,
        Method::POST,
        "/checkout",
        Some("ann"),
        Some(json!({ "product_id": product_id, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://checkout.example/pay");

    let orders = state
        .gateway
        .blocking(|db| db.orders_for_user("ann"))
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total_cents, 899 * 3);
    assert_eq!(orders[0].status, "pending");
    assert_eq!(orders[0].checkout_session_id, "cs_test_ann");

    let (status, _) = call(
        &app,
        Method::POST,
        "/checkout",
        Some("ann"),
        Some(json!({ "product_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_without_processor_is_unavailable() {
    let app = router(state(false));
    let (status, _) = call(
        &app,
        Method::POST,
        "/checkout",
        Some("ann"),
        Some(json!({ "product_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn reminder_run_reports_counts() {
    let state = state(false);
    let activity = add_activity(&state, Some(Duration::minutes(50))).await;
    let app = router(state);

    call(&app, Method::POST, &format!("/activities/{}/registration", activity), Some("ann"), None).await;
    let (status, summary) = call(&app, Method::POST, "/reminders/run", Some("ann"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary, json!({ "events_checked": 1, "notifications_sent": 1 }));
}

#[tokio::test]
async fn session_chat_posts_and_lists() {
    let state = state(false);
    let session = add_activity(&state, None).await;
    let app = router(state);
    let uri = format!("/sessions/{}/chat", session);

    let (status, _) = call(&app, Method::POST, &uri, Some("ann"), Some(json!({ "body": "hello all" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, chat) = call(&app, Method::GET, &uri, Some("ben"), None).await;
    assert_eq!(chat[0]["body"], "hello all");
    assert_eq!(chat[0]["user_id"], "ann");
}
