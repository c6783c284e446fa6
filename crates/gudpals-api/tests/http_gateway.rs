//! `HttpGateway` against the real router served on a loopback port.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

use gudpals_api::auth::create_token;
use gudpals_api::{AppState, AppStateInner, router};
use gudpals_db::{Database, DbOptions};
use gudpals_realtime::dispatcher::Dispatcher;
use gudpals_realtime::tokens::ChannelTokens;
use gudpals_sync::{ChatRoom, Gateway, HttpGateway, LocalGateway, RegistrationWriter, SyncError};
use gudpals_types::events::{FeedCommand, FeedEvent, FeedFilter};
use gudpals_types::models::{Activity, LiveSessionState, NotificationKind};

const SECRET: &str = "http-gateway-secret";
const WAIT: StdDuration = StdDuration::from_secs(5);

struct Server {
    base_url: String,
    state: AppState,
}

impl Server {
    async fn start() -> Self {
        let db = Database::open_in_memory(DbOptions::default()).unwrap();
        let gateway = LocalGateway::new(
            Arc::new(db),
            Dispatcher::new(),
            ChannelTokens::new("http-gateway-channels", 300),
        );
        let state = Arc::new(AppStateInner {
            gateway,
            jwt_secret: SECRET.into(),
            payments: None,
            public_url: "http://localhost".into(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    fn token(&self, user: &str) -> String {
        create_token(SECRET, user, user, Duration::hours(1)).unwrap()
    }

    fn gateway(&self, user: &str) -> HttpGateway {
        HttpGateway::new(self.base_url.clone(), self.token(user), user)
    }

    fn local(&self) -> &LocalGateway {
        &self.state.gateway
    }

    async fn add_activity(&self, starts_in: Duration) -> Uuid {
        let activity = Activity {
            id: Uuid::new_v4(),
            title: "Book Circle".into(),
            starts_at: Some(Utc::now() + starts_in),
            live: LiveSessionState::offline(),
        };
        let id = activity.id;
        self.local()
            .blocking(move |db| db.insert_activity(&activity))
            .await
            .unwrap();
        id
    }
}

async fn next_message(room: &mut ChatRoom<HttpGateway>) {
    loop {
        let event = timeout(WAIT, room.next()).await.unwrap().unwrap();
        if matches!(event, FeedEvent::MessageCreated(_)) {
            return;
        }
    }
}

#[tokio::test]
async fn hi_appears_once_over_http() {
    let server = Server::start().await;
    let mut alice = ChatRoom::open(server.gateway("alice"), "alice", "bob").await.unwrap();
    let mut bob = ChatRoom::open(server.gateway("bob"), "bob", "alice").await.unwrap();

    alice.send("hi").await.unwrap();
    next_message(&mut bob).await;
    next_message(&mut alice).await;
    bob.reload().await.unwrap();
    alice.sync().await;

    for room in [&alice, &bob] {
        let his = room.messages().iter().filter(|m| m.body == "hi").count();
        assert_eq!(his, 1);
    }
}

#[tokio::test]
async fn remote_register_once_notifies_once() {
    let server = Server::start().await;
    let activity = server.add_activity(Duration::days(2)).await;
    let writer = RegistrationWriter::new(server.gateway("ann"));

    let first = writer.register_once("ann", activity).await.unwrap();
    let second = writer.register_once("ann", activity).await.unwrap();
    assert!(first.is_created());
    assert!(!second.is_created());
    assert_eq!(second.registration().id, first.registration().id);

    let all = server
        .local()
        .blocking(|db| db.all_notifications("ann"))
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all.iter().filter(|n| n.kind == NotificationKind::Reminder).count(), 3);
    assert_eq!(all.iter().filter(|n| n.title == "Registration Successful").count(), 1);
}

#[tokio::test]
async fn every_commit_after_subscribe_is_delivered() {
    let server = Server::start().await;
    let bob = server.gateway("bob");

    for round in 0..20 {
        let mut sub = bob
            .subscribe(FeedFilter::Inbox {
                receiver_id: "bob".into(),
            })
            .await
            .unwrap();
        let body = format!("ping {}", round);
        let sent = server.local().send_message("alice", "bob", &body).await.unwrap();

        let event = timeout(WAIT, sub.recv()).await.unwrap();
        assert_eq!(event, Some(FeedEvent::MessageCreated(sent)), "round {}", round);
        sub.release();
    }
}

#[tokio::test]
async fn gateway_refuses_someone_elses_conversation() {
    let server = Server::start().await;
    let eve = server.gateway("eve");
    let result = eve
        .subscribe(FeedFilter::Conversation {
            user_id: "alice".into(),
            partner_id: "bob".into(),
        })
        .await;
    assert!(matches!(result, Err(SyncError::Auth(_))));
}

#[tokio::test]
async fn feed_drops_foreign_filters() {
    let server = Server::start().await;
    let url = format!(
        "{}/feed?token={}",
        server.base_url.replacen("http://", "ws://", 1),
        server.token("eve")
    );
    let (mut ws, _) = connect_async(url).await.unwrap();

    let foreign = FeedFilter::Conversation {
        user_id: "alice".into(),
        partner_id: "bob".into(),
    };
    let own = FeedFilter::Inbox {
        receiver_id: "eve".into(),
    };
    let command = FeedCommand::Subscribe {
        filters: vec![foreign, own.clone()],
    };
    ws.send(WsMessage::Text(serde_json::to_string(&command).unwrap().into()))
        .await
        .unwrap();

    let installed = loop {
        let frame = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        let WsMessage::Text(text) = frame else {
            continue;
        };
        if let FeedEvent::Subscribed { filters } = serde_json::from_str::<FeedEvent>(&text).unwrap() {
            break filters;
        }
    };
    assert_eq!(installed, vec![own]);

    // Alice writes to Bob, then to Eve. Only the second reaches Eve.
    server.local().send_message("alice", "bob", "private").await.unwrap();
    let to_eve = server.local().send_message("alice", "eve", "hello eve").await.unwrap();

    let delivered = loop {
        let frame = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        let WsMessage::Text(text) = frame else {
            continue;
        };
        break serde_json::from_str::<FeedEvent>(&text).unwrap();
    };
    assert_eq!(delivered, FeedEvent::MessageCreated(to_eve));
}
