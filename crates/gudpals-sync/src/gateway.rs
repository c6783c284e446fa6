use std::future::Future;

use uuid::Uuid;

use gudpals_types::api::{LiveStartResponse, NotificationCreate};
use gudpals_types::events::FeedFilter;
use gudpals_types::models::{
    Activity, LiveSessionState, Message, Notification, Profile, Registration, SessionChat,
};

use crate::error::Result;
use crate::feed::Subscription;

/// Request/response facade over the remote store plus its push feed.
///
/// Every write broadcasts the matching feed event once it has committed.
/// Sequences come back already ordered: conversations and session chat
/// ascending by creation time, per-user listings newest first.
pub trait Gateway: Clone + Send + Sync + 'static {
    fn conversation_messages(&self, user: &str, partner: &str) -> impl Future<Output = Result<Vec<Message>>> + Send;

    fn messages_for_user(&self, user: &str) -> impl Future<Output = Result<Vec<Message>>> + Send;

    /// Store a message. Blank bodies are rejected as `InvalidRecord`.
    fn send_message(&self, sender: &str, receiver: &str, body: &str) -> impl Future<Output = Result<Message>> + Send;

    /// Flip `is_read` on everything `sender` sent to `reader`. Returns rows flipped.
    fn mark_read(&self, reader: &str, sender: &str) -> impl Future<Output = Result<usize>> + Send;

    fn session_chat(&self, session_id: Uuid) -> impl Future<Output = Result<Vec<SessionChat>>> + Send;

    fn send_session_chat(
        &self,
        session_id: Uuid,
        user: &str,
        body: &str,
    ) -> impl Future<Output = Result<SessionChat>> + Send;

    fn find_registration(&self, user: &str, activity_id: Uuid) -> impl Future<Output = Result<Option<Registration>>> + Send;

    /// Unconditional insert. Callers wanting create-or-noop go through
    /// `RegistrationWriter`.
    fn insert_registration(&self, user: &str, activity_id: Uuid) -> impl Future<Output = Result<Registration>> + Send;

    /// Returns the number of rows removed, zero when there was nothing to remove.
    fn delete_registration(&self, user: &str, activity_id: Uuid) -> impl Future<Output = Result<usize>> + Send;

    fn registrations_for_user(&self, user: &str) -> impl Future<Output = Result<Vec<Registration>>> + Send;

    fn activity(&self, id: Uuid) -> impl Future<Output = Result<Activity>> + Send;

    /// Mint a channel and tokens for the activity and mark it live.
    fn start_live(&self, activity_id: Uuid) -> impl Future<Output = Result<LiveStartResponse>> + Send;

    fn stop_live(&self, activity_id: Uuid) -> impl Future<Output = Result<LiveSessionState>> + Send;

    fn profile(&self, id: &str) -> impl Future<Output = Result<Option<Profile>>> + Send;

    fn insert_notification(&self, notification: NotificationCreate) -> impl Future<Output = Result<Notification>> + Send;

    /// Open a push feed restricted to `filter`. Events committed after this
    /// resolves are delivered in commit order.
    fn subscribe(&self, filter: FeedFilter) -> impl Future<Output = Result<Subscription>> + Send;
}
