use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Barrier;
use uuid::Uuid;

use gudpals_db::{Database, DbOptions};
use gudpals_realtime::dispatcher::Dispatcher;
use gudpals_realtime::media_hub::MediaHub;
use gudpals_realtime::tokens::ChannelTokens;
use gudpals_sync::{
    ChatRoom, Gateway, LiveState, LiveViewer, LocalGateway, RegistrationOutcome, RegistrationWriter,
    Subscription, SyncError, end_live, go_live,
};
use gudpals_types::api::{LiveStartResponse, NotificationCreate};
use gudpals_types::events::{FeedEvent, FeedFilter};
use gudpals_types::models::{
    Activity, LiveSessionState, Message, Notification, NotificationKind, Profile, Registration,
    SessionChat,
};

const SECRET: &str = "integration-secret";

fn gateway(options: DbOptions) -> LocalGateway {
    let db = Database::open_in_memory(options).unwrap();
    LocalGateway::new(Arc::new(db), Dispatcher::new(), ChannelTokens::new(SECRET, 300))
}

async fn add_activity(gw: &LocalGateway, starts_in: Option<Duration>) -> Uuid {
    let activity = Activity {
        id: Uuid::new_v4(),
        title: "Morning Stretch".into(),
        starts_at: starts_in.map(|d| Utc::now() + d),
        live: LiveSessionState::offline(),
    };
    let id = activity.id;
    gw.blocking(move |db| db.insert_activity(&activity)).await.unwrap();
    id
}

/// Holds every existence check until two callers have made one, so both
/// see "not registered" before either inserts.
#[derive(Clone)]
struct LockstepGateway {
    inner: LocalGateway,
    barrier: Arc<Barrier>,
}

impl Gateway for LockstepGateway {
    async fn conversation_messages(&self, user: &str, partner: &str) -> gudpals_sync::Result<Vec<Message>> {
        self.inner.conversation_messages(user, partner).await
    }

    async fn messages_for_user(&self, user: &str) -> gudpals_sync::Result<Vec<Message>> {
        self.inner.messages_for_user(user).await
    }

    async fn send_message(&self, sender: &str, receiver: &str, body: &str) -> gudpals_sync::Result<Message> {
        self.inner.send_message(sender, receiver, body).await
    }

    async fn mark_read(&self, reader: &str, sender: &str) -> gudpals_sync::Result<usize> {
        self.inner.mark_read(reader, sender).await
    }

    async fn session_chat(&self, session_id: Uuid) -> gudpals_sync::Result<Vec<SessionChat>> {
        self.inner.session_chat(session_id).await
    }

    async fn send_session_chat(&self, session_id: Uuid, user: &str, body: &str) -> gudpals_sync::Result<SessionChat> {
        self.inner.send_session_chat(session_id, user, body).await
    }

    async fn find_registration(&self, user: &str, activity_id: Uuid) -> gudpals_sync::Result<Option<Registration>> {
        let found = self.inner.find_registration(user, activity_id).await?;
        self.barrier.wait().await;
        Ok(found)
    }

    async fn insert_registration(&self, user: &str, activity_id: Uuid) -> gudpals_sync::Result<Registration> {
        self.inner.insert_registration(user, activity_id).await
    }

    async fn delete_registration(&self, user: &str, activity_id: Uuid) -> gudpals_sync::Result<usize> {
        self.inner.delete_registration(user, activity_id).await
    }

    async fn registrations_for_user(&self, user: &str) -> gudpals_sync::Result<Vec<Registration>> {
        self.inner.registrations_for_user(user).await
    }

    async fn activity(&self, id: Uuid) -> gudpals_sync::Result<Activity> {
        self.inner.activity(id).await
    }

    async fn start_live(&self, activity_id: Uuid) -> gudpals_sync::Result<LiveStartResponse> {
        self.inner.start_live(activity_id).await
    }

    async fn stop_live(&self, activity_id: Uuid) -> gudpals_sync::Result<LiveSessionState> {
        self.inner.stop_live(activity_id).await
    }

    async fn profile(&self, id: &str) -> gudpals_sync::Result<Option<Profile>> {
        self.inner.profile(id).await
    }

    async fn insert_notification(&self, notification: NotificationCreate) -> gudpals_sync::Result<Notification> {
        self.inner.insert_notification(notification).await
    }

    async fn subscribe(&self, filter: FeedFilter) -> gudpals_sync::Result<Subscription> {
        self.inner.subscribe(filter).await
    }
}

async fn race(options: DbOptions) -> (LocalGateway, Uuid, [gudpals_sync::Result<RegistrationOutcome>; 2]) {
    let gw = gateway(options);
    let activity = add_activity(&gw, None).await;
    let lockstep = LockstepGateway {
        inner: gw.clone(),
        barrier: Arc::new(Barrier::new(2)),
    };

    let first = RegistrationWriter::new(lockstep.clone());
    let second = RegistrationWriter::new(lockstep);
    let (a, b) = tokio::join!(
        first.register_once("ann", activity),
        second.register_once("ann", activity)
    );
    (gw, activity, [a, b])
}

#[tokio::test]
async fn check_then_insert_race_creates_duplicates_without_unique_index() {
    let (gw, activity, results) = race(DbOptions::default()).await;

    assert!(results.iter().all(|r| matches!(r, Ok(RegistrationOutcome::Created(_)))));
    let count = gw
        .blocking(move |db| db.count_registrations("ann", activity))
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn unique_index_closes_the_race() {
    let (gw, activity, results) = race(DbOptions {
        unique_registrations: true,
    })
    .await;

    let created = results
        .iter()
        .filter(|r| matches!(r, Ok(RegistrationOutcome::Created(_))))
        .count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(SyncError::Duplicate(_))))
        .count();
    assert_eq!((created, duplicates), (1, 1));

    let count = gw
        .blocking(move |db| db.count_registrations("ann", activity))
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn sequential_register_once_is_idempotent() {
    let gw = gateway(DbOptions::default());
    let activity = add_activity(&gw, Some(Duration::days(2))).await;
    let writer = RegistrationWriter::new(gw.clone());

    let first = writer.register_once("ann", activity).await.unwrap();
    let second = writer.register_once("ann", activity).await.unwrap();
    assert!(first.is_created());
    assert!(!second.is_created());
    assert_eq!(second.registration().id, first.registration().id);
    assert!(writer.is_registered("ann", activity).await.unwrap());
    assert_eq!(writer.registrations("ann").await.unwrap().len(), 1);

    // Confirmation now, three reminders later
    let all = gw.blocking(|db| db.all_notifications("ann")).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all.iter().filter(|n| n.kind == NotificationKind::Reminder).count(), 3);
    let delivered = gw.notifications("ann", Utc::now()).await.unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].title, "Registration Successful");
}

#[tokio::test]
async fn unregister_missing_registration_is_a_noop() {
    let gw = gateway(DbOptions::default());
    let activity = add_activity(&gw, None).await;
    let writer = RegistrationWriter::new(gw);

    assert_eq!(writer.unregister("ann", activity).await.unwrap(), 0);
    assert_eq!(writer.unregister("ann", Uuid::new_v4()).await.unwrap(), 0);

    writer.register_once("ann", activity).await.unwrap();
    assert_eq!(writer.unregister("ann", activity).await.unwrap(), 1);
    assert!(!writer.is_registered("ann", activity).await.unwrap());
}

#[tokio::test]
async fn hi_appears_once_for_both_subscribed_users() {
    let gw = gateway(DbOptions::default());
    let mut alice = ChatRoom::open(gw.clone(), "alice", "bob").await.unwrap();
    let mut bob = ChatRoom::open(gw.clone(), "bob", "alice").await.unwrap();

    alice.send("hi").await.unwrap();

    // Bob receives the push; Alice receives the echo of her own write
    bob.next().await.unwrap();
    alice.next().await.unwrap();
    bob.sync().await;
    alice.sync().await;

    // A late reload must not add a second copy either
    bob.reload().await.unwrap();

    for room in [&alice, &bob] {
        let his: Vec<_> = room.messages().iter().filter(|m| m.body == "hi").collect();
        assert_eq!(his.len(), 1);
    }
}

#[tokio::test]
async fn live_broadcast_is_followed_by_viewers() {
    let gw = gateway(DbOptions::default());
    let hub = MediaHub::new(gw.tokens().clone());
    let activity = add_activity(&gw, None).await;

    let mut viewer = LiveViewer::open(gw.clone(), hub.clone(), activity).await.unwrap();
    assert_eq!(viewer.state(), LiveState::Disconnected);

    let mut host = go_live(&gw, hub.clone(), activity).await.unwrap();
    assert!(matches!(viewer.next().await, Some(LiveState::Connected { .. })));

    let session = viewer.session_mut().unwrap();
    session.next_event().await.unwrap();
    session.next_event().await.unwrap();
    assert_eq!(session.tracks().len(), 2);

    end_live(&gw, &mut host, activity).await.unwrap();
    assert_eq!(viewer.next().await, Some(LiveState::Disconnected));
    assert!(!gw.activity(activity).await.unwrap().live.is_live);
    assert_eq!(hub.participant_count(&gudpals_sync::local::channel_name(activity)).await, 0);

    viewer.close().await;
}

#[tokio::test]
async fn viewer_with_stale_token_lands_in_failed() {
    let gw = gateway(DbOptions::default());
    let activity = add_activity(&gw, None).await;
    let state = LiveSessionState::live(gudpals_sync::local::channel_name(activity), "stale".into());
    gw.blocking(move |db| db.set_live_state(activity, &state)).await.unwrap();

    // Hub signs with a different secret than the one that minted the stored token
    let hub = MediaHub::new(ChannelTokens::new("other-secret", 300));
    let mut viewer = LiveViewer::open(gw, hub, activity).await.unwrap();
    assert!(matches!(viewer.state(), LiveState::Failed { .. }));
    viewer.close().await;
    assert_eq!(viewer.state(), LiveState::Disconnected);
}

#[tokio::test]
async fn released_subscription_gets_nothing_more() {
    let gw = gateway(DbOptions::default());
    let mut sub = gw
        .subscribe(FeedFilter::Inbox {
            receiver_id: "bob".into(),
        })
        .await
        .unwrap();

    let sent = gw.send_message("alice", "bob", "first").await.unwrap();
    assert_eq!(sub.recv().await, Some(FeedEvent::MessageCreated(sent)));

    sub.release();
    gw.send_message("alice", "bob", "second").await.unwrap();
    assert_eq!(sub.recv().await, None);
}
