//! Live video session lifecycle.
//!
//! `LiveSession` is the join state machine for one participant:
//! `Disconnected -> Connecting -> Connected`, back to `Disconnected` on
//! leave, or `Failed` when the join is rejected. Hosts publish tracks;
//! audience members subscribe to each published track as it is announced.

use std::future::Future;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use gudpals_realtime::media_hub::MediaHub;
use gudpals_types::events::{FeedEvent, FeedFilter};
use gudpals_types::media::{ChannelRole, MediaEvent, PeerId, RemoteTrack, TrackKind};

use crate::error::{Result, SyncError};
use crate::feed::Subscription;
use crate::gateway::Gateway;

/// Channel-based signaling and track transport.
pub trait MediaService: Clone + Send + Sync + 'static {
    fn join(
        &self,
        channel: &str,
        token: &str,
        role: ChannelRole,
    ) -> impl Future<Output = Result<(PeerId, mpsc::UnboundedReceiver<MediaEvent>)>> + Send;

    fn publish(&self, channel: &str, peer: PeerId, kinds: &[TrackKind]) -> impl Future<Output = Result<()>> + Send;

    fn unpublish(&self, channel: &str, peer: PeerId, kinds: &[TrackKind]) -> impl Future<Output = Result<()>> + Send;

    fn subscribe(
        &self,
        channel: &str,
        subscriber: PeerId,
        publisher: PeerId,
        kind: TrackKind,
    ) -> impl Future<Output = Result<RemoteTrack>> + Send;

    fn leave(&self, channel: &str, peer: PeerId) -> impl Future<Output = ()> + Send;
}

impl MediaService for MediaHub {
    async fn join(
        &self,
        channel: &str,
        token: &str,
        role: ChannelRole,
    ) -> Result<(PeerId, mpsc::UnboundedReceiver<MediaEvent>)> {
        Ok(MediaHub::join(self, channel, token, role).await?)
    }

    async fn publish(&self, channel: &str, peer: PeerId, kinds: &[TrackKind]) -> Result<()> {
        Ok(MediaHub::publish(self, channel, peer, kinds).await?)
    }

    async fn unpublish(&self, channel: &str, peer: PeerId, kinds: &[TrackKind]) -> Result<()> {
        Ok(MediaHub::unpublish(self, channel, peer, kinds).await?)
    }

    async fn subscribe(
        &self,
        channel: &str,
        subscriber: PeerId,
        publisher: PeerId,
        kind: TrackKind,
    ) -> Result<RemoteTrack> {
        Ok(MediaHub::subscribe(self, channel, subscriber, publisher, kind).await?)
    }

    async fn leave(&self, channel: &str, peer: PeerId) {
        MediaHub::leave(self, channel, peer).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveState {
    Disconnected,
    Connecting,
    Connected { peer: PeerId },
    Failed { reason: String },
}

impl LiveState {
    pub fn peer(&self) -> Option<PeerId> {
        match self {
            Self::Connected { peer } => Some(*peer),
            _ => None,
        }
    }
}

pub struct LiveSession<M: MediaService> {
    media: M,
    channel: String,
    role: ChannelRole,
    state: watch::Sender<LiveState>,
    events: Option<mpsc::UnboundedReceiver<MediaEvent>>,
    tracks: Vec<RemoteTrack>,
}

impl<M: MediaService> LiveSession<M> {
    pub fn new(media: M, channel: impl Into<String>, role: ChannelRole) -> Self {
        let (state, _) = watch::channel(LiveState::Disconnected);
        Self {
            media,
            channel: channel.into(),
            role,
            state,
            events: None,
            tracks: Vec::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn state(&self) -> LiveState {
        self.state.borrow().clone()
    }

    /// Observe state transitions.
    pub fn watch(&self) -> watch::Receiver<LiveState> {
        self.state.subscribe()
    }

    /// Remote tracks currently subscribed, in arrival order.
    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    /// Join the channel. A rejected join moves to `Failed` and returns the error.
    pub async fn join(&mut self, token: &str) -> Result<PeerId> {
        if let Some(peer) = self.state.borrow().peer() {
            return Ok(peer);
        }

        self.state.send_replace(LiveState::Connecting);
        match self.media.join(&self.channel, token, self.role).await {
            Ok((peer, events)) => {
                self.events = Some(events);
                self.state.send_replace(LiveState::Connected { peer });
                info!("Joined '{}' as {:?} ({})", self.channel, self.role, peer);
                Ok(peer)
            }
            Err(e) => {
                error!("Failed to join '{}': {}", self.channel, e);
                self.state.send_replace(LiveState::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub async fn publish(&mut self, kinds: &[TrackKind]) -> Result<()> {
        let peer = self.connected_peer()?;
        self.media.publish(&self.channel, peer, kinds).await
    }

    /// Stop sending `kinds` (mute). Audience members drop the matching tracks.
    pub async fn unpublish(&mut self, kinds: &[TrackKind]) -> Result<()> {
        let peer = self.connected_peer()?;
        self.media.unpublish(&self.channel, peer, kinds).await
    }

    /// Handle every media event already queued. Returns how many were handled.
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) else {
                break;
            };
            self.handle(event).await;
            handled += 1;
        }
        handled
    }

    /// Wait for one media event and handle it. `None` when not connected.
    pub async fn next_event(&mut self) -> Option<MediaEvent> {
        let event = self.events.as_mut()?.recv().await?;
        self.handle(event.clone()).await;
        Some(event)
    }

    /// Leave the channel and drop every listener, whatever the current state.
    pub async fn leave(&mut self) {
        let previous = self.state.send_replace(LiveState::Disconnected);
        self.events = None;
        self.tracks.clear();

        if let Some(peer) = previous.peer() {
            self.media.leave(&self.channel, peer).await;
            info!("Left '{}' ({})", self.channel, peer);
        }
    }

    fn connected_peer(&self) -> Result<PeerId> {
        self.state
            .borrow()
            .peer()
            .ok_or_else(|| SyncError::Media(format!("not connected to '{}'", self.channel)))
    }

    async fn handle(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::PeerPublished { peer, kind } => {
                if self.role != ChannelRole::Audience {
                    return;
                }
                let Ok(me) = self.connected_peer() else {
                    return;
                };
                match self.media.subscribe(&self.channel, me, peer, kind).await {
                    Ok(track) => {
                        debug!("Subscribed to {:?} from {}", kind, peer);
                        self.tracks.push(track);
                    }
                    Err(e) => warn!("Failed to subscribe to {:?} from {}: {}", kind, peer, e),
                }
            }
            MediaEvent::PeerUnpublished { peer, kind } => {
                self.tracks.retain(|t| !(t.peer == peer && t.kind == kind));
            }
            MediaEvent::PeerLeft { peer } => {
                self.tracks.retain(|t| t.peer != peer);
            }
        }
    }
}

impl<M: MediaService> Drop for LiveSession<M> {
    fn drop(&mut self) {
        let Some(peer) = self.state.borrow().peer() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("LiveSession for '{}' dropped outside a runtime, peer {} not removed", self.channel, peer);
            return;
        };

        let media = self.media.clone();
        let channel = std::mem::take(&mut self.channel);
        handle.spawn(async move {
            media.leave(&channel, peer).await;
        });
    }
}

/// Start broadcasting an activity: mark it live, join as host, publish
/// audio and video.
pub async fn go_live<G: Gateway, M: MediaService>(gateway: &G, media: M, activity_id: Uuid) -> Result<LiveSession<M>> {
    let started = gateway.start_live(activity_id).await?;
    let channel = started
        .state
        .channel_name
        .clone()
        .ok_or_else(|| SyncError::InvalidRecord("live state without channel".into()))?;

    let mut session = LiveSession::new(media, channel, ChannelRole::Host);
    session.join(&started.host_token).await?;
    session.publish(&[TrackKind::Audio, TrackKind::Video]).await?;
    Ok(session)
}

/// Leave the channel, then clear the activity's live state.
pub async fn end_live<G: Gateway, M: MediaService>(
    gateway: &G,
    session: &mut LiveSession<M>,
    activity_id: Uuid,
) -> Result<()> {
    session.leave().await;
    gateway.stop_live(activity_id).await?;
    Ok(())
}

/// Audience view of one activity. Joins when the activity goes live and
/// leaves when it goes off air.
pub struct LiveViewer<G: Gateway, M: MediaService> {
    gateway: G,
    activity_id: Uuid,
    feed: Subscription,
    session: Option<LiveSession<M>>,
    media: M,
}

impl<G: Gateway, M: MediaService> LiveViewer<G, M> {
    pub async fn open(gateway: G, media: M, activity_id: Uuid) -> Result<Self> {
        let feed = gateway.subscribe(FeedFilter::Activity { activity_id }).await?;
        let activity = gateway.activity(activity_id).await?;

        let mut viewer = Self {
            gateway,
            activity_id,
            feed,
            session: None,
            media,
        };
        if let Some((channel, token)) = activity.live.join_target() {
            viewer.connect(channel.to_string(), token.to_string()).await;
        }
        Ok(viewer)
    }

    pub fn activity_id(&self) -> Uuid {
        self.activity_id
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn session(&self) -> Option<&LiveSession<M>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut LiveSession<M>> {
        self.session.as_mut()
    }

    pub fn state(&self) -> LiveState {
        self.session
            .as_ref()
            .map_or(LiveState::Disconnected, |s| s.state())
    }

    /// Wait for the next live-state change of the activity and follow it.
    /// `None` once the feed has closed.
    pub async fn next(&mut self) -> Option<LiveState> {
        loop {
            let event = self.feed.recv().await?;
            let FeedEvent::LiveStateChanged { activity_id, state } = event else {
                continue;
            };
            if activity_id != self.activity_id {
                continue;
            }

            match state.join_target() {
                Some((channel, token)) => {
                    let (channel, token) = (channel.to_string(), token.to_string());
                    if let Some(mut stale) = self.session.take() {
                        stale.leave().await;
                    }
                    self.connect(channel, token).await;
                }
                None => {
                    if let Some(mut session) = self.session.take() {
                        session.leave().await;
                    }
                }
            }
            return Some(self.state());
        }
    }

    pub async fn close(&mut self) {
        self.feed.release();
        if let Some(mut session) = self.session.take() {
            session.leave().await;
        }
    }

    async fn connect(&mut self, channel: String, token: String) {
        let mut session = LiveSession::new(self.media.clone(), channel, ChannelRole::Audience);
        // Failure is kept in the session state for the caller to observe
        let _ = session.join(&token).await;
        self.session = Some(session);
    }
}
