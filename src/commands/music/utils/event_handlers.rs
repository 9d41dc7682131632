use serenity::all::{CreateEmbed, CreateMessage, Http};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::audio_node::NodeEvent;
use super::embedded_messages;
use super::music_manager::{MusicError, MusicManager};
use super::player_session::TrackEndOutcome;
use super::track::Track;

/// Voice websocket close code Discord sends when the bot was removed from the channel
pub const VOICE_DISCONNECTED: u16 = 4014;

/// Something worth telling the guild after a node event
#[derive(Debug)]
pub enum Announcement {
    NowPlaying(Track),
    QueueFinished,
    Failed(MusicError),
    Disconnected(String),
}

impl Announcement {
    pub fn embed(&self) -> CreateEmbed {
        match self {
            Announcement::NowPlaying(track) => embedded_messages::now_playing(track),
            Announcement::QueueFinished => embedded_messages::queue_finished(),
            Announcement::Failed(err) => embedded_messages::error_embed("play the next track", err),
            Announcement::Disconnected(reason) => embedded_messages::voice_closed(reason),
        }
    }
}

/// Feed one node event into the affected session
pub async fn apply_node_event(music: &MusicManager, event: NodeEvent) -> Option<Announcement> {
    match event {
        NodeEvent::Ready {
            session_id,
            resumed,
        } => {
            info!("Audio node ready with session {} (resumed: {})", session_id, resumed);
            None
        }
        NodeEvent::TrackStarted { guild_id, playback } => {
            debug!("Node started playback {:?} in guild {}", playback, guild_id);
            None
        }
        NodeEvent::TrackEnded {
            guild_id,
            playback,
            reason,
        } => {
            let Some(playback) = playback else {
                debug!("Ignoring end of an untagged track in guild {}", guild_id);
                return None;
            };

            match music.track_ended(guild_id, playback, reason).await {
                Ok(TrackEndOutcome::Advanced(track)) => Some(Announcement::NowPlaying(track)),
                Ok(TrackEndOutcome::QueueExhausted) => Some(Announcement::QueueFinished),
                Ok(TrackEndOutcome::Ignored | TrackEndOutcome::Stopped) => None,
                Err(err) => {
                    warn!("Playback failed in guild {}: {}", guild_id, err);
                    Some(Announcement::Failed(err))
                }
            }
        }
        NodeEvent::PositionUpdate {
            guild_id,
            position,
            timestamp_ms,
        } => {
            let received_ms = chrono::Utc::now().timestamp_millis();
            trace!(
                "Position {:?} in guild {} (node clock {}, local {})",
                position, guild_id, timestamp_ms, received_ms
            );
            music.update_position(guild_id, position, received_ms).await;
            None
        }
        NodeEvent::VoiceClosed {
            guild_id,
            code,
            reason,
            by_remote,
        } => {
            if code != VOICE_DISCONNECTED {
                warn!(
                    "Voice connection closed in guild {} (code {}, remote: {}): {}",
                    guild_id, code, by_remote, reason
                );
                return None;
            }

            match music.teardown(guild_id).await {
                Ok(true) => Some(Announcement::Disconnected(reason)),
                Ok(false) => None,
                Err(err) => {
                    warn!("Failed to tear down session in guild {}: {}", guild_id, err);
                    Some(Announcement::Disconnected(reason))
                }
            }
        }
    }
}

/// Handle node events in the background, one task per event.
pub fn dispatch_node_events(
    music: Arc<MusicManager>,
    http: Arc<Http>,
    mut events: UnboundedReceiver<NodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let music = Arc::clone(&music);
            let http = Arc::clone(&http);

            tokio::spawn(async move {
                let guild_id = event.guild_id();
                // Looked up first: the session may be gone once the event is applied
                let channel = match guild_id {
                    Some(guild_id) => music.text_channel(guild_id).await,
                    None => None,
                };

                let Some(announcement) = apply_node_event(&music, event).await else {
                    return;
                };
                let Some(channel) = channel else {
                    debug!("No text channel to announce {:?} in", announcement);
                    return;
                };

                if let Err(e) = channel
                    .send_message(&http, CreateMessage::new().embed(announcement.embed()))
                    .await
                {
                    error!("Failed to send announcement to channel {}: {}", channel, e);
                }
            });
        }

        info!("Audio node event stream ended");
    })
}
