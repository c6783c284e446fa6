//! In-process live video signaling.
//!
//! Participants join a named channel with a channel token and a role. Hosts
//! publish audio/video tracks; every other participant is told about each
//! published track and may subscribe to it. Late joiners are told about
//! tracks that were published before they arrived.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use gudpals_types::media::{ChannelRole, MediaEvent, PeerId, RemoteTrack, TrackKind};

use crate::tokens::{ChannelTokens, TokenError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("token does not permit joining as {0:?}")]
    RoleNotPermitted(ChannelRole),

    #[error("peer {0} is not in channel '{1}'")]
    NotInChannel(PeerId, String),

    #[error("only hosts may publish")]
    NotHost,

    #[error("peer {0} has not published {1:?}")]
    TrackNotPublished(PeerId, TrackKind),
}

struct Participant {
    role: ChannelRole,
    events: mpsc::UnboundedSender<MediaEvent>,
    published: HashSet<TrackKind>,
}

#[derive(Clone)]
pub struct MediaHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    tokens: ChannelTokens,
    /// channel name -> (peer -> participant)
    channels: RwLock<HashMap<String, HashMap<PeerId, Participant>>>,
}

impl MediaHub {
    pub fn new(tokens: ChannelTokens) -> Self {
        Self {
            inner: Arc::new(HubInner {
                tokens,
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Join a channel. Returns the new peer id and its event stream, already
    /// primed with the tracks other participants have published.
    pub async fn join(
        &self,
        channel: &str,
        token: &str,
        role: ChannelRole,
    ) -> Result<(PeerId, mpsc::UnboundedReceiver<MediaEvent>), HubError> {
        let claims = self.inner.tokens.verify(token, channel)?;
        if !claims.role.permits(role) {
            return Err(HubError::RoleNotPermitted(role));
        }

        let peer = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut channels = self.inner.channels.write().await;
        let members = channels.entry(channel.to_string()).or_default();

        for (&other, participant) in members.iter() {
            for &kind in &participant.published {
                let _ = tx.send(MediaEvent::PeerPublished { peer: other, kind });
            }
        }

        members.insert(
            peer,
            Participant {
                role,
                events: tx,
                published: HashSet::new(),
            },
        );

        info!("Peer {} joined channel '{}' as {:?} ({} present)", peer, channel, role, members.len());
        Ok((peer, rx))
    }

    pub async fn publish(&self, channel: &str, peer: PeerId, kinds: &[TrackKind]) -> Result<(), HubError> {
        let mut channels = self.inner.channels.write().await;
        let members = channels
            .get_mut(channel)
            .ok_or_else(|| HubError::NotInChannel(peer, channel.to_string()))?;

        let participant = members
            .get_mut(&peer)
            .ok_or_else(|| HubError::NotInChannel(peer, channel.to_string()))?;
        if participant.role != ChannelRole::Host {
            return Err(HubError::NotHost);
        }

        let fresh: Vec<TrackKind> = kinds
            .iter()
            .copied()
            .filter(|kind| participant.published.insert(*kind))
            .collect();

        for kind in fresh {
            notify_others(members, peer, MediaEvent::PeerPublished { peer, kind });
        }
        Ok(())
    }

    pub async fn unpublish(&self, channel: &str, peer: PeerId, kinds: &[TrackKind]) -> Result<(), HubError> {
        let mut channels = self.inner.channels.write().await;
        let members = channels
            .get_mut(channel)
            .ok_or_else(|| HubError::NotInChannel(peer, channel.to_string()))?;

        let participant = members
            .get_mut(&peer)
            .ok_or_else(|| HubError::NotInChannel(peer, channel.to_string()))?;

        let removed: Vec<TrackKind> = kinds
            .iter()
            .copied()
            .filter(|kind| participant.published.remove(kind))
            .collect();

        for kind in removed {
            notify_others(members, peer, MediaEvent::PeerUnpublished { peer, kind });
        }
        Ok(())
    }

    /// Subscribe `subscriber` to one of `publisher`'s tracks.
    pub async fn subscribe(
        &self,
        channel: &str,
        subscriber: PeerId,
        publisher: PeerId,
        kind: TrackKind,
    ) -> Result<RemoteTrack, HubError> {
        let channels = self.inner.channels.read().await;
        let members = channels
            .get(channel)
            .ok_or_else(|| HubError::NotInChannel(subscriber, channel.to_string()))?;

        if !members.contains_key(&subscriber) {
            return Err(HubError::NotInChannel(subscriber, channel.to_string()));
        }

        let published = members
            .get(&publisher)
            .map(|p| p.published.contains(&kind))
            .unwrap_or(false);
        if !published {
            return Err(HubError::TrackNotPublished(publisher, kind));
        }

        debug!("Peer {} subscribed to {:?} of {} in '{}'", subscriber, kind, publisher, channel);
        Ok(RemoteTrack {
            channel: channel.to_string(),
            peer: publisher,
            kind,
        })
    }

    /// Leave a channel. Leaving twice, or leaving a channel never joined, is a no-op.
    pub async fn leave(&self, channel: &str, peer: PeerId) {
        let mut channels = self.inner.channels.write().await;
        let Some(members) = channels.get_mut(channel) else {
            return;
        };

        if members.remove(&peer).is_none() {
            return;
        }
        notify_others(members, peer, MediaEvent::PeerLeft { peer });
        info!("Peer {} left channel '{}' ({} remain)", peer, channel, members.len());

        if members.is_empty() {
            channels.remove(channel);
        }
    }

    pub async fn participant_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .await
            .get(channel)
            .map_or(0, |members| members.len())
    }
}

fn notify_others(members: &HashMap<PeerId, Participant>, from: PeerId, event: MediaEvent) {
    for (&peer, participant) in members {
        if peer != from {
            let _ = participant.events.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> (MediaHub, ChannelTokens) {
        let tokens = ChannelTokens::new("secret", 60);
        (MediaHub::new(tokens.clone()), tokens)
    }

    #[tokio::test]
    async fn audience_hears_about_published_tracks() {
        let (hub, tokens) = hub();
        let host_token = tokens.mint("c", ChannelRole::Host).unwrap();
        let viewer_token = tokens.mint("c", ChannelRole::Audience).unwrap();

        let (host, _host_rx) = hub.join("c", &host_token, ChannelRole::Host).await.unwrap();
        let (viewer, mut viewer_rx) = hub.join("c", &viewer_token, ChannelRole::Audience).await.unwrap();

        hub.publish("c", host, &[TrackKind::Audio, TrackKind::Video]).await.unwrap();
        assert_eq!(
            viewer_rx.recv().await.unwrap(),
            MediaEvent::PeerPublished { peer: host, kind: TrackKind::Audio }
        );
        assert_eq!(
            viewer_rx.recv().await.unwrap(),
            MediaEvent::PeerPublished { peer: host, kind: TrackKind::Video }
        );

        let track = hub.subscribe("c", viewer, host, TrackKind::Video).await.unwrap();
        assert_eq!(track.peer, host);
    }

    #[tokio::test]
    async fn unpublish_notifies_only_for_published_tracks() {
        let (hub, tokens) = hub();
        let token = tokens.mint("c", ChannelRole::Host).unwrap();
        let (host, _host_rx) = hub.join("c", &token, ChannelRole::Host).await.unwrap();
        let (viewer, mut viewer_rx) = hub.join("c", &token, ChannelRole::Audience).await.unwrap();

        hub.publish("c", host, &[TrackKind::Audio]).await.unwrap();
        viewer_rx.recv().await.unwrap();

        hub.unpublish("c", host, &[TrackKind::Audio, TrackKind::Video]).await.unwrap();
        assert_eq!(
            viewer_rx.recv().await.unwrap(),
            MediaEvent::PeerUnpublished { peer: host, kind: TrackKind::Audio }
        );
        assert!(viewer_rx.try_recv().is_err());
        assert_eq!(
            hub.subscribe("c", viewer, host, TrackKind::Audio).await.unwrap_err(),
            HubError::TrackNotPublished(host, TrackKind::Audio)
        );
    }

    #[tokio::test]
    async fn late_joiner_is_primed_with_existing_tracks() {
        let (hub, tokens) = hub();
        let token = tokens.mint("c", ChannelRole::Host).unwrap();
        let (host, _rx) = hub.join("c", &token, ChannelRole::Host).await.unwrap();
        hub.publish("c", host, &[TrackKind::Video]).await.unwrap();

        let (_viewer, mut rx) = hub.join("c", &token, ChannelRole::Audience).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            MediaEvent::PeerPublished { peer: host, kind: TrackKind::Video }
        );
    }

    #[tokio::test]
    async fn audience_token_cannot_host_or_publish() {
        let (hub, tokens) = hub();
        let token = tokens.mint("c", ChannelRole::Audience).unwrap();
        assert_eq!(
            hub.join("c", &token, ChannelRole::Host).await.unwrap_err(),
            HubError::RoleNotPermitted(ChannelRole::Host)
        );

        let (viewer, _rx) = hub.join("c", &token, ChannelRole::Audience).await.unwrap();
        assert_eq!(hub.publish("c", viewer, &[TrackKind::Audio]).await.unwrap_err(), HubError::NotHost);
    }

    #[tokio::test]
    async fn leave_notifies_and_drops_empty_channel() {
        let (hub, tokens) = hub();
        let token = tokens.mint("c", ChannelRole::Host).unwrap();
        let (a, _a_rx) = hub.join("c", &token, ChannelRole::Host).await.unwrap();
        let (_b, mut b_rx) = hub.join("c", &token, ChannelRole::Audience).await.unwrap();

        hub.leave("c", a).await;
        hub.leave("c", a).await;
        assert_eq!(b_rx.recv().await.unwrap(), MediaEvent::PeerLeft { peer: a });
        assert_eq!(hub.participant_count("c").await, 1);
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let (hub, _) = hub();
        let err = hub.join("c", "not-a-token", ChannelRole::Audience).await.unwrap_err();
        assert_eq!(err, HubError::Token(TokenError::Invalid));
        assert_eq!(hub.participant_count("c").await, 0);
    }
}
