//! In-process gateway backed by the SQLite store and the feed dispatcher.
//!
//! The REST handlers use this as their service layer, so HTTP clients and
//! in-process clients see the same writes and the same feed events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use gudpals_db::Database;
use gudpals_realtime::dispatcher::Dispatcher;
use gudpals_realtime::tokens::ChannelTokens;
use gudpals_types::api::{IdentityProfile, LiveStartResponse, NotificationCreate, clean_body};
use gudpals_types::events::{FeedEvent, FeedFilter};
use gudpals_types::media::ChannelRole;
use gudpals_types::models::{
    Activity, Connection, FriendRequest, FriendRequestStatus, LiveSessionState, Message,
    Notification, NotificationKind, Profile, Registration, SessionChat,
};

use crate::error::{Result, SyncError};
use crate::feed::Subscription;
use crate::gateway::Gateway;

/// Live channel name for an activity.
pub fn channel_name(activity_id: Uuid) -> String {
    format!("activity-{}", activity_id)
}

#[derive(Clone)]
pub struct LocalGateway {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    tokens: ChannelTokens,
}

impl LocalGateway {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, tokens: ChannelTokens) -> Self {
        Self {
            db,
            dispatcher,
            tokens,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn tokens(&self) -> &ChannelTokens {
        &self.tokens
    }

    /// Run a store call off the async workers.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> gudpals_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                SyncError::Network(format!("store task failed: {}", e))
            })?
            .map_err(SyncError::from)
    }

    // -- Profiles --

    /// Mirror the identity provider's record into `profiles`. Returns true
    /// when the row was created rather than updated.
    pub async fn sync_profile(&self, user_id: &str, identity: &IdentityProfile) -> Result<bool> {
        let profile = Profile {
            id: user_id.to_string(),
            display_name: identity.display_name(),
            email: identity.email.clone(),
            phone_number: identity.phone_number.clone(),
            photo_url: identity.image_url.clone(),
            last_login_at: Some(Utc::now()),
        };

        let created = self
            .blocking(move |db| {
                if db.get_profile(&profile.id)?.is_some() {
                    db.update_profile(&profile)?;
                    Ok(false)
                } else {
                    db.insert_profile(&profile)?;
                    Ok(true)
                }
            })
            .await?;

        info!("Profile {} synced (created: {})", user_id, created);
        Ok(created)
    }

    // -- Friends --

    pub async fn send_friend_request(
        &self,
        sender: &str,
        receiver: &str,
        message: Option<String>,
    ) -> Result<FriendRequest> {
        if sender == receiver {
            return Err(SyncError::InvalidRecord("cannot befriend yourself".into()));
        }

        let request = FriendRequest {
            id: Uuid::new_v4(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            message: message.and_then(|m| clean_body(&m).map(str::to_string)),
            status: FriendRequestStatus::Pending,
            created_at: Utc::now(),
        };
        let row = request.clone();
        self.blocking(move |db| db.insert_friend_request(&row)).await?;
        self.dispatcher
            .broadcast(FeedEvent::FriendRequestUpdated(request.clone()));

        let sender_name = self.display_name(sender).await;
        self.notify(NotificationCreate {
            user_id: receiver.to_string(),
            title: "New Friend Request".into(),
            body: format!("{} wants to connect with you", sender_name),
            kind: NotificationKind::Info,
            action_url: Some("/friends".into()),
            deliver_at: None,
        })
        .await;

        Ok(request)
    }

    pub async fn pending_friend_requests(&self, receiver: &str) -> Result<Vec<FriendRequest>> {
        let receiver = receiver.to_string();
        self.blocking(move |db| db.pending_friend_requests(&receiver)).await
    }

    /// Accept a request addressed to `receiver`. Anyone else gets `NotFound`.
    pub async fn accept_friend_request(&self, request_id: Uuid, receiver: &str) -> Result<Connection> {
        let owner = receiver.to_string();
        let (request, connection) = self
            .blocking(move |db| db.accept_friend_request(request_id, &owner, Uuid::new_v4(), Utc::now()))
            .await?;
        self.dispatcher
            .broadcast(FeedEvent::FriendRequestUpdated(request.clone()));

        let receiver_name = self.display_name(receiver).await;
        self.notify(NotificationCreate {
            user_id: request.sender_id.clone(),
            title: "Friend Request Accepted".into(),
            body: format!("{} accepted your friend request", receiver_name),
            kind: NotificationKind::Success,
            action_url: Some("/friends".into()),
            deliver_at: None,
        })
        .await;

        Ok(connection)
    }

    pub async fn reject_friend_request(&self, request_id: Uuid, receiver: &str) -> Result<FriendRequest> {
        let owner = receiver.to_string();
        let request = self
            .blocking(move |db| db.reject_friend_request(request_id, &owner))
            .await?;
        self.dispatcher
            .broadcast(FeedEvent::FriendRequestUpdated(request.clone()));
        Ok(request)
    }

    pub async fn connections(&self, user: &str) -> Result<Vec<Connection>> {
        let user = user.to_string();
        self.blocking(move |db| db.connections_for(&user)).await
    }

    // -- Notifications --

    pub async fn notifications(&self, user: &str, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        let user = user.to_string();
        self.blocking(move |db| db.delivered_notifications(&user, now)).await
    }

    pub async fn mark_notification_read(&self, id: Uuid, user: &str) -> Result<usize> {
        let user = user.to_string();
        self.blocking(move |db| db.mark_notification_read(id, &user)).await
    }

    /// Best-effort notification. Failures are logged and swallowed.
    async fn notify(&self, notification: NotificationCreate) {
        let user = notification.user_id.clone();
        if let Err(e) = self.insert_notification(notification).await {
            error!("Failed to notify {}: {}", user, e);
        }
    }

    async fn display_name(&self, user: &str) -> String {
        match self.profile(user).await {
            Ok(Some(profile)) => profile.display_name,
            _ => "Someone".to_string(),
        }
    }
}

impl Gateway for LocalGateway {
    async fn conversation_messages(&self, user: &str, partner: &str) -> Result<Vec<Message>> {
        let (user, partner) = (user.to_string(), partner.to_string());
        self.blocking(move |db| db.conversation_messages(&user, &partner)).await
    }

    async fn messages_for_user(&self, user: &str) -> Result<Vec<Message>> {
        let user = user.to_string();
        self.blocking(move |db| db.messages_for_user(&user)).await
    }

    async fn send_message(&self, sender: &str, receiver: &str, body: &str) -> Result<Message> {
        let body = clean_body(body).ok_or_else(|| SyncError::InvalidRecord("empty message body".into()))?;
        if receiver.is_empty() {
            return Err(SyncError::InvalidRecord("missing receiver".into()));
        }

        let message = Message {
            id: Uuid::new_v4(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            body: body.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };
        let row = message.clone();
        self.blocking(move |db| db.insert_message(&row)).await?;

        self.dispatcher
            .broadcast(FeedEvent::MessageCreated(message.clone()));
        Ok(message)
    }

    async fn mark_read(&self, reader: &str, sender: &str) -> Result<usize> {
        let (reader_id, sender_id) = (reader.to_string(), sender.to_string());
        let (r, s) = (reader_id.clone(), sender_id.clone());
        let count = self.blocking(move |db| db.mark_read(&r, &s)).await?;

        if count > 0 {
            self.dispatcher.broadcast(FeedEvent::MessagesRead {
                reader_id,
                sender_id,
                count,
            });
        }
        Ok(count)
    }

    async fn session_chat(&self, session_id: Uuid) -> Result<Vec<SessionChat>> {
        self.blocking(move |db| db.session_chat(session_id)).await
    }

    async fn send_session_chat(&self, session_id: Uuid, user: &str, body: &str) -> Result<SessionChat> {
        let body = clean_body(body)
            .ok_or_else(|| SyncError::InvalidRecord("empty chat body".into()))?
            .to_string();
        let user = user.to_string();

        let chat = self
            .blocking(move |db| db.insert_session_chat(Uuid::new_v4(), session_id, &user, &body, Utc::now()))
            .await?;

        self.dispatcher
            .broadcast(FeedEvent::SessionChatCreated(chat.clone()));
        Ok(chat)
    }

    async fn find_registration(&self, user: &str, activity_id: Uuid) -> Result<Option<Registration>> {
        let user = user.to_string();
        self.blocking(move |db| db.find_registration(&user, activity_id)).await
    }

    async fn insert_registration(&self, user: &str, activity_id: Uuid) -> Result<Registration> {
        let registration = Registration {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            activity_id,
            registered_at: Utc::now(),
        };
        let row = registration.clone();
        self.blocking(move |db| db.insert_registration(&row)).await?;

        info!("{} registered for activity {}", user, activity_id);
        self.dispatcher
            .broadcast(FeedEvent::RegistrationCreated(registration.clone()));
        Ok(registration)
    }

    async fn delete_registration(&self, user: &str, activity_id: Uuid) -> Result<usize> {
        let user_id = user.to_string();
        let owner = user_id.clone();
        let removed = self
            .blocking(move |db| db.delete_registration(&owner, activity_id))
            .await?;

        if removed > 0 {
            self.dispatcher.broadcast(FeedEvent::RegistrationDeleted {
                user_id,
                activity_id,
            });
        }
        Ok(removed)
    }

    async fn registrations_for_user(&self, user: &str) -> Result<Vec<Registration>> {
        let user = user.to_string();
        self.blocking(move |db| db.registrations_for_user(&user)).await
    }

    async fn activity(&self, id: Uuid) -> Result<Activity> {
        self.blocking(move |db| db.get_activity(id))
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("activity {}", id)))
    }

    async fn start_live(&self, activity_id: Uuid) -> Result<LiveStartResponse> {
        let channel = channel_name(activity_id);
        let audience_token = self.tokens.mint(&channel, ChannelRole::Audience)?;
        let host_token = self.tokens.mint(&channel, ChannelRole::Host)?;

        let state = LiveSessionState::live(channel, audience_token);
        let row = state.clone();
        self.blocking(move |db| db.set_live_state(activity_id, &row)).await?;

        info!("Activity {} is live", activity_id);
        self.dispatcher.broadcast(FeedEvent::LiveStateChanged {
            activity_id,
            state: state.clone(),
        });
        Ok(LiveStartResponse { state, host_token })
    }

    async fn stop_live(&self, activity_id: Uuid) -> Result<LiveSessionState> {
        let state = LiveSessionState::offline();
        let row = state.clone();
        self.blocking(move |db| db.set_live_state(activity_id, &row)).await?;

        info!("Activity {} went off air", activity_id);
        self.dispatcher.broadcast(FeedEvent::LiveStateChanged {
            activity_id,
            state: state.clone(),
        });
        Ok(state)
    }

    async fn profile(&self, id: &str) -> Result<Option<Profile>> {
        let id = id.to_string();
        self.blocking(move |db| db.get_profile(&id)).await
    }

    async fn insert_notification(&self, notification: NotificationCreate) -> Result<Notification> {
        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            title: notification.title,
            body: notification.body,
            kind: notification.kind,
            action_url: notification.action_url,
            is_read: false,
            deliver_at: notification.deliver_at.unwrap_or(now),
        };
        let row = notification.clone();
        self.blocking(move |db| db.insert_notification(&row)).await?;

        // Scheduled reminders stay silent until the client lists them
        if notification.deliver_at <= now {
            self.dispatcher
                .broadcast(FeedEvent::NotificationCreated(notification.clone()));
        }
        Ok(notification)
    }

    async fn subscribe(&self, filter: FeedFilter) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = self.dispatcher.forward(filter.clone(), tx);
        Ok(Subscription::new(filter, rx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gudpals_db::DbOptions;

    fn gateway() -> LocalGateway {
        let db = Database::open_in_memory(DbOptions::default()).unwrap();
        LocalGateway::new(Arc::new(db), Dispatcher::new(), ChannelTokens::new("test-secret", 60))
    }

    async fn activity(gw: &LocalGateway) -> Uuid {
        let activity = Activity {
            id: Uuid::new_v4(),
            title: "Chair yoga".into(),
            starts_at: None,
            live: LiveSessionState::offline(),
        };
        let id = activity.id;
        gw.blocking(move |db| db.insert_activity(&activity)).await.unwrap();
        id
    }

    #[tokio::test]
    async fn send_message_trims_and_rejects_blank() {
        let gw = gateway();
        let sent = gw.send_message("alice", "bob", "  hi  ").await.unwrap();
        assert_eq!(sent.body, "hi");
        assert!(matches!(
            gw.send_message("alice", "bob", "   ").await,
            Err(SyncError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn writes_reach_matching_subscribers_only() {
        let gw = gateway();
        let mut bob = gw
            .subscribe(FeedFilter::Inbox {
                receiver_id: "bob".into(),
            })
            .await
            .unwrap();

        gw.send_message("alice", "carol", "not for bob").await.unwrap();
        let sent = gw.send_message("alice", "bob", "hi").await.unwrap();

        assert_eq!(bob.recv().await, Some(FeedEvent::MessageCreated(sent)));
        assert_eq!(bob.try_recv(), None);
    }

    #[tokio::test]
    async fn mark_read_broadcasts_only_when_rows_change() {
        let gw = gateway();
        let mut feed = gw
            .subscribe(FeedFilter::Conversation {
                user_id: "bob".into(),
                partner_id: "alice".into(),
            })
            .await
            .unwrap();

        assert_eq!(gw.mark_read("bob", "alice").await.unwrap(), 0);
        gw.send_message("alice", "bob", "one").await.unwrap();
        assert_eq!(gw.mark_read("bob", "alice").await.unwrap(), 1);

        assert!(matches!(feed.recv().await, Some(FeedEvent::MessageCreated(_))));
        assert_eq!(
            feed.recv().await,
            Some(FeedEvent::MessagesRead {
                reader_id: "bob".into(),
                sender_id: "alice".into(),
                count: 1,
            })
        );
    }

    #[tokio::test]
    async fn live_start_and_stop_round_trip_through_activity() {
        let gw = gateway();
        let id = activity(&gw).await;

        let started = gw.start_live(id).await.unwrap();
        let (channel, token) = started.state.join_target().unwrap();
        assert_eq!(channel, channel_name(id));
        let claims = gw.tokens().verify(token, channel).unwrap();
        assert_eq!(claims.role, ChannelRole::Audience);
        assert_eq!(gw.activity(id).await.unwrap().live, started.state);

        gw.stop_live(id).await.unwrap();
        assert!(!gw.activity(id).await.unwrap().live.is_live);
    }

    #[tokio::test]
    async fn missing_activity_is_not_found() {
        let gw = gateway();
        assert!(matches!(gw.activity(Uuid::new_v4()).await, Err(SyncError::NotFound(_))));
        assert!(matches!(gw.start_live(Uuid::new_v4()).await, Err(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn profile_sync_creates_then_updates() {
        let gw = gateway();
        let identity = IdentityProfile {
            first_name: Some("Ada".into()),
            ..Default::default()
        };
        assert!(gw.sync_profile("u1", &identity).await.unwrap());

        let renamed = IdentityProfile {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            ..Default::default()
        };
        assert!(!gw.sync_profile("u1", &renamed).await.unwrap());
        let profile = gw.profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.display_name, "Ada Lovelace");
        assert!(profile.last_login_at.is_some());
    }

    #[tokio::test]
    async fn friend_request_flow_notifies_both_sides() {
        let gw = gateway();
        let request = gw
            .send_friend_request("alice", "bob", Some(" hello ".into()))
            .await
            .unwrap();
        assert_eq!(request.message.as_deref(), Some("hello"));
        assert_eq!(gw.pending_friend_requests("bob").await.unwrap().len(), 1);

        // Only the receiver may answer
        assert!(matches!(
            gw.accept_friend_request(request.id, "alice").await,
            Err(SyncError::NotFound(_))
        ));

        let connection = gw.accept_friend_request(request.id, "bob").await.unwrap();
        assert_eq!(gw.connections("alice").await.unwrap(), vec![connection]);
        assert!(gw.pending_friend_requests("bob").await.unwrap().is_empty());

        let now = Utc::now();
        assert_eq!(gw.notifications("bob", now).await.unwrap().len(), 1);
        let alice = gw.notifications("alice", now).await.unwrap();
        assert_eq!(alice[0].title, "Friend Request Accepted");
        assert_eq!(alice[0].kind, NotificationKind::Success);
    }

    #[tokio::test]
    async fn self_friend_request_is_rejected() {
        let gw = gateway();
        assert!(matches!(
            gw.send_friend_request("alice", "alice", None).await,
            Err(SyncError::InvalidRecord(_))
        ));
    }
}
