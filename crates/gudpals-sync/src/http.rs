//! Gateway over the GUDPALS REST API and feed WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gudpals_types::api::{
    LiveStartResponse, MarkReadRequest, MarkReadResponse, NotificationCreate, RegistrationCreate, RemovedResponse,
    SendMessageRequest, SessionChatRequest,
};
use gudpals_types::events::{FeedCommand, FeedEvent, FeedFilter};
use gudpals_types::models::{
    Activity, LiveSessionState, Message, Notification, Profile, Registration, SessionChat,
};

use crate::error::{Result, SyncError};
use crate::feed::Subscription;
use crate::gateway::Gateway;

const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway for a signed-in user talking to a remote server.
///
/// The server derives identity from the bearer token, so operations acting
/// on behalf of anyone but `user_id` fail with `Auth` before any request.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: String,
    user_id: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn ensure_self(&self, user: &str) -> Result<()> {
        if user != self.user_id {
            return Err(SyncError::Auth(format!(
                "session for {} cannot act as {}",
                self.user_id, user
            )));
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    fn feed_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/feed?token={}", ws_base, self.token)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        Ok(resp.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }
}

fn status_error(status: StatusCode, body: String) -> SyncError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        body
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Auth(detail),
        StatusCode::NOT_FOUND => SyncError::NotFound(detail),
        StatusCode::CONFLICT => SyncError::Duplicate(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => SyncError::InvalidRecord(detail),
        _ => SyncError::Network(format!("{}: {}", status, detail)),
    }
}

impl Gateway for HttpGateway {
    async fn conversation_messages(&self, user: &str, partner: &str) -> Result<Vec<Message>> {
        self.ensure_self(user)?;
        self.send(
            self.request(Method::GET, "/messages")
                .query(&[("partner", partner)]),
        )
        .await
    }

    async fn messages_for_user(&self, user: &str) -> Result<Vec<Message>> {
        self.ensure_self(user)?;
        self.get("/messages/inbox").await
    }

    async fn send_message(&self, sender: &str, receiver: &str, body: &str) -> Result<Message> {
        self.ensure_self(sender)?;
        let req = SendMessageRequest {
            receiver_id: receiver.to_string(),
            body: body.to_string(),
        };
        self.post("/messages", &req).await
    }

    async fn mark_read(&self, reader: &str, sender: &str) -> Result<usize> {
        self.ensure_self(reader)?;
        let req = MarkReadRequest {
            sender_id: sender.to_string(),
        };
        let resp: MarkReadResponse = self.post("/messages/read", &req).await?;
        Ok(resp.updated)
    }

    async fn session_chat(&self, session_id: Uuid) -> Result<Vec<SessionChat>> {
        self.get(&format!("/sessions/{}/chat", session_id)).await
    }

    async fn send_session_chat(&self, session_id: Uuid, user: &str, body: &str) -> Result<SessionChat> {
        self.ensure_self(user)?;
        let req = SessionChatRequest {
            body: body.to_string(),
        };
        self.post(&format!("/sessions/{}/chat", session_id), &req).await
    }

    async fn find_registration(&self, user: &str, activity_id: Uuid) -> Result<Option<Registration>> {
        self.ensure_self(user)?;
        self.get(&format!("/activities/{}/registration", activity_id)).await
    }

    async fn insert_registration(&self, user: &str, activity_id: Uuid) -> Result<Registration> {
        self.ensure_self(user)?;
        self.post("/registrations", &RegistrationCreate { activity_id }).await
    }

    async fn delete_registration(&self, user: &str, activity_id: Uuid) -> Result<usize> {
        self.ensure_self(user)?;
        let resp: RemovedResponse = self
            .send(self.request(Method::DELETE, &format!("/activities/{}/registration", activity_id)))
            .await?;
        Ok(resp.removed)
    }

    async fn registrations_for_user(&self, user: &str) -> Result<Vec<Registration>> {
        self.ensure_self(user)?;
        self.get("/registrations").await
    }

    async fn activity(&self, id: Uuid) -> Result<Activity> {
        self.get(&format!("/activities/{}", id)).await
    }

    async fn start_live(&self, activity_id: Uuid) -> Result<LiveStartResponse> {
        self.send(self.request(Method::POST, &format!("/activities/{}/live/start", activity_id)))
            .await
    }

    async fn stop_live(&self, activity_id: Uuid) -> Result<LiveSessionState> {
        self.send(self.request(Method::POST, &format!("/activities/{}/live/stop", activity_id)))
            .await
    }

    async fn profile(&self, id: &str) -> Result<Option<Profile>> {
        match self.get(&format!("/profiles/{}", id)).await {
            Ok(profile) => Ok(Some(profile)),
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert_notification(&self, notification: NotificationCreate) -> Result<Notification> {
        self.post("/notifications", &notification).await
    }

    async fn subscribe(&self, filter: FeedFilter) -> Result<Subscription> {
        if !filter.visible_to(&self.user_id) {
            return Err(SyncError::Auth(format!(
                "session for {} cannot subscribe to {:?}",
                self.user_id, filter
            )));
        }

        let (ws, _response) = connect_async(self.feed_url()).await?;
        let (mut sink, mut stream) = ws.split();

        let command = FeedCommand::Subscribe {
            filters: vec![filter.clone()],
        };
        let text = serde_json::to_string(&command).map_err(|e| SyncError::InvalidRecord(e.to_string()))?;
        sink.send(WsMessage::Text(text.into())).await?;

        // Resolve only once the server has the filter in place
        let installed = tokio::time::timeout(SUBSCRIBE_TIMEOUT, async {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => return Err(SyncError::from(e)),
                };
                match serde_json::from_str::<FeedEvent>(&text) {
                    Ok(FeedEvent::Subscribed { filters }) => return Ok(filters),
                    Ok(FeedEvent::Ready { user_id }) => debug!("Feed ready for {}", user_id),
                    Ok(other) => debug!("Ignoring feed event before ack: {:?}", other),
                    Err(e) => warn!("Dropping undecodable feed event: {}", e),
                }
            }
            Err(SyncError::Network("feed closed before subscribe was acknowledged".into()))
        })
        .await
        .map_err(|_| SyncError::Network("feed subscribe was not acknowledged".into()))??;

        if !installed.contains(&filter) {
            return Err(SyncError::Auth(format!("feed refused filter {:?}", filter)));
        }
        info!("Feed subscribed to {:?}", filter);

        let (tx, rx) = mpsc::unbounded_channel();
        let task_filter = filter.clone();
        let task = tokio::spawn(async move {
            // Keep the sink alive so the socket stays open
            let _sink = sink;
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Feed socket error: {}", e);
                        break;
                    }
                };

                let event = match serde_json::from_str::<FeedEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Dropping undecodable feed event: {}", e);
                        continue;
                    }
                };

                if task_filter.matches(&event) && tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(filter, rx, task))
    }
}
