//! The seam between the player and the external audio node that does the actual
//! decoding and streaming. Sessions only ever talk to an [`AudioNode`]; the Lavalink
//! client in [`super::lavalink`] is the production implementation.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use super::track::{PlaybackId, Track};

/// Errors reported by the audio node client
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Audio node is not connected")]
    NotReady,

    #[error("Voice connection failed: {0}")]
    Voice(String),

    #[error("HTTP request to the audio node failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Audio node websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Unexpected payload from the audio node: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Audio node rejected the request: {0}")]
    Rejected(String),

    #[error("Track failed to play: {0}")]
    TrackFailed(String),

    #[error("Invalid node configuration: {0}")]
    Config(String),
}

pub type NodeResult<T> = Result<T, NodeError>;

/// Why a track stopped playing on the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEndReason {
    /// Played to the end
    Finished,
    /// Stopped on request
    Stopped,
    /// Another track was started in its place
    Replaced,
    /// The node tore the player down
    Cleanup,
    /// Playback failed; the node's message is kept
    Failed(String),
}

/// Asynchronous events coming back from the node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Ready {
        session_id: String,
        resumed: bool,
    },
    TrackStarted {
        guild_id: GuildId,
        playback: Option<PlaybackId>,
    },
    TrackEnded {
        guild_id: GuildId,
        playback: Option<PlaybackId>,
        reason: TrackEndReason,
    },
    PositionUpdate {
        guild_id: GuildId,
        position: Duration,
        /// Unix time in milliseconds at which the node measured `position`
        timestamp_ms: i64,
    },
    VoiceClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

impl NodeEvent {
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            NodeEvent::Ready { .. } => None,
            NodeEvent::TrackStarted { guild_id, .. }
            | NodeEvent::TrackEnded { guild_id, .. }
            | NodeEvent::PositionUpdate { guild_id, .. }
            | NodeEvent::VoiceClosed { guild_id, .. } => Some(*guild_id),
        }
    }
}

/// Playback directives for one guild's player on the node
#[async_trait]
pub trait AudioNode: Send + Sync {
    /// Join the voice channel and hand the voice session to the node
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> NodeResult<()>;

    /// Start `track`, replacing whatever is playing. Resolves once the node confirms the
    /// start (or reports a failure) for `playback`.
    async fn play(&self, guild_id: GuildId, track: &Track, playback: PlaybackId) -> NodeResult<()>;

    async fn stop(&self, guild_id: GuildId) -> NodeResult<()>;

    async fn pause(&self, guild_id: GuildId) -> NodeResult<()>;

    async fn resume(&self, guild_id: GuildId) -> NodeResult<()>;

    async fn seek(&self, guild_id: GuildId, position: Duration) -> NodeResult<()>;

    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> NodeResult<()>;

    /// Destroy the player and leave the voice channel
    async fn disconnect(&self, guild_id: GuildId) -> NodeResult<()>;
}

/// Outcome of looking an identifier up on the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadResult {
    Track(Track),
    Playlist { name: String, tracks: Vec<Track> },
    Search(Vec<Track>),
    Empty,
}

#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve a URL or a prefixed search (`ytsearch:...`) into tracks
    async fn load(&self, identifier: &str) -> NodeResult<LoadResult>;
}
