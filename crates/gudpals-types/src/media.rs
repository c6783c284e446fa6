use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one participant inside a live video channel.
pub type PeerId = Uuid;

/// A host publishes tracks; an audience member only subscribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Host,
    Audience,
}

impl ChannelRole {
    /// Whether a token minted for `self` may join as `requested`.
    pub fn permits(self, requested: ChannelRole) -> bool {
        matches!((self, requested), (Self::Host, _) | (Self::Audience, Self::Audience))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Asynchronous notifications delivered to a channel participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MediaEvent {
    PeerPublished { peer: PeerId, kind: TrackKind },
    PeerUnpublished { peer: PeerId, kind: TrackKind },
    PeerLeft { peer: PeerId },
}

/// A subscribed remote track, ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub channel: String,
    pub peer: PeerId,
    pub kind: TrackKind,
}
