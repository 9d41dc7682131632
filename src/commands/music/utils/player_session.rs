use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::audio_node::{AudioNode, NodeError, TrackEndReason};
use super::music_manager::{MusicError, MusicResult, bounded};
use super::queue_manager::{Queue, QueueSnapshot};
use super::track::{PlaybackId, Track};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No voice connection yet
    Idle,
    /// In a voice channel with nothing playing
    ConnectedEmpty,
    Playing,
    Paused,
    /// Torn down; the session is never used again
    Disconnected,
}

/// The track currently loaded on the node, and which start of it this is
#[derive(Debug, Clone)]
struct NowPlaying {
    track: Track,
    playback: PlaybackId,
}

/// Result of adding a track to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Nothing was playing, so this track started right away
    Started(Track),
    /// Waiting in the queue at a 1-based position
    Queued { track: Track, position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub skipped: Track,
    /// The track that started in its place, if the queue had one
    pub next: Option<Track>,
}

/// What a session did with a track-ended notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEndOutcome {
    /// Stale or irrelevant event
    Ignored,
    /// The next queued track started
    Advanced(Track),
    /// Last track finished, nothing left
    QueueExhausted,
    /// Current track was stopped externally
    Stopped,
}

/// By-value view of a session for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub state: PlayerState,
    pub current: Option<Track>,
    pub position: Duration,
    pub volume: u8,
    pub queue: QueueSnapshot,
    /// Playback the snapshot was taken during, echoed back by the skip control
    pub playback: Option<PlaybackId>,
}

impl SessionSnapshot {
    /// Snapshot for a guild with no session at all
    pub fn idle(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: PlayerState::Idle,
            current: None,
            position: Duration::ZERO,
            volume: 0,
            queue: QueueSnapshot::default(),
            playback: None,
        }
    }
}

/// Playback state for one guild with a live voice connection
pub struct PlayerSession {
    guild_id: GuildId,
    channel_id: Option<ChannelId>,
    text_channel_id: Option<ChannelId>,
    queue: Queue,
    current: Option<NowPlaying>,
    // Last known position and the unix millis it was measured at
    position: Duration,
    position_at_ms: i64,
    // Unix millis of the last play or seek; older progress reports are dropped
    reset_at_ms: i64,
    paused: bool,
    volume: u8,
    closed: bool,
    // Shared with every other session so ids are never reused after a teardown
    playbacks: Arc<AtomicU64>,
    node: Arc<dyn AudioNode>,
    node_timeout: Duration,
}

impl std::fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSession")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl PlayerSession {
    pub fn new(guild_id: GuildId, node: Arc<dyn AudioNode>, node_timeout: Duration) -> Self {
        Self {
            guild_id,
            channel_id: None,
            text_channel_id: None,
            queue: Queue::new(),
            current: None,
            position: Duration::ZERO,
            position_at_ms: 0,
            reset_at_ms: 0,
            paused: false,
            volume: 100,
            closed: false,
            playbacks: Arc::default(),
            node,
            node_timeout,
        }
    }

    /// Draw playback ids from `counter` instead of a counter of this session's own
    pub fn with_playback_ids(mut self, counter: Arc<AtomicU64>) -> Self {
        self.playbacks = counter;
        self
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id
    }

    /// Channel announcements for this session are sent to
    pub fn text_channel(&self) -> Option<ChannelId> {
        self.text_channel_id
    }

    pub fn set_text_channel(&mut self, channel_id: Option<ChannelId>) {
        if channel_id.is_some() {
            self.text_channel_id = channel_id;
        }
    }

    pub fn state(&self) -> PlayerState {
        if self.closed {
            PlayerState::Disconnected
        } else if self.channel_id.is_none() {
            PlayerState::Idle
        } else {
            match (&self.current, self.paused) {
                (None, _) => PlayerState::ConnectedEmpty,
                (Some(_), true) => PlayerState::Paused,
                (Some(_), false) => PlayerState::Playing,
            }
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref().map(|now| &now.track)
    }

    pub fn current_playback(&self) -> Option<PlaybackId> {
        self.current.as_ref().map(|now| now.playback)
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Best estimate of the playback position right now
    pub fn position(&self) -> Duration {
        let Some(now) = &self.current else {
            return Duration::ZERO;
        };

        let position = if self.paused {
            self.position
        } else {
            let elapsed = (now_ms() - self.position_at_ms).max(0) as u64;
            self.position + Duration::from_millis(elapsed)
        };

        position.min(now.track.duration())
    }

    fn ensure_connected(&self) -> MusicResult<()> {
        if self.closed {
            Err(MusicError::SessionClosed)
        } else if self.channel_id.is_none() {
            Err(MusicError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn clear_current(&mut self) {
        self.current = None;
        self.paused = false;
        self.position = Duration::ZERO;
    }

    fn reset_position(&mut self, position: Duration) {
        let now = now_ms();
        self.position = position;
        self.position_at_ms = now;
        self.reset_at_ms = now;
    }

    /// Join `channel_id` through the audio node
    pub async fn connect(&mut self, channel_id: ChannelId) -> MusicResult<()> {
        if self.closed {
            return Err(MusicError::SessionClosed);
        }
        if let Some(current) = self.channel_id {
            return Err(MusicError::AlreadyConnected(current));
        }

        bounded(
            self.node_timeout,
            "connect",
            self.node.connect(self.guild_id, channel_id),
        )
        .await?;

        self.channel_id = Some(channel_id);
        info!("Connected to voice channel {} in guild {}", channel_id, self.guild_id);
        Ok(())
    }

    async fn start_track(&mut self, track: Track) -> MusicResult<()> {
        let playback = PlaybackId(self.playbacks.fetch_add(1, Ordering::Relaxed) + 1);

        self.current = Some(NowPlaying {
            track: track.clone(),
            playback,
        });
        self.paused = false;
        self.reset_position(Duration::ZERO);

        debug!(
            "Starting {} (playback {}) in guild {}",
            track.title(),
            playback,
            self.guild_id
        );

        let result = tokio::time::timeout(
            self.node_timeout,
            self.node.play(self.guild_id, &track, playback),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                info!("Now playing {} in guild {}", track.title(), self.guild_id);
                Ok(())
            }
            Ok(Err(NodeError::TrackFailed(reason))) => {
                self.clear_current();
                Err(MusicError::PlaybackFailed {
                    title: track.title().to_string(),
                    reason,
                })
            }
            Ok(Err(source)) => {
                self.clear_current();
                Err(MusicError::Node {
                    action: "play",
                    source,
                })
            }
            Err(_) => {
                self.clear_current();
                warn!(
                    "Node did not confirm {} within {:?} in guild {}, stopping",
                    track.title(),
                    self.node_timeout,
                    self.guild_id
                );
                if let Err(e) = bounded(self.node_timeout, "stop", self.node.stop(self.guild_id)).await
                {
                    warn!("Failed to stop after play timeout in guild {}: {}", self.guild_id, e);
                }
                Err(MusicError::NodeTimeout {
                    action: "play",
                    after: self.node_timeout,
                })
            }
        }
    }

    /// Play `track` now, replacing the current one
    pub async fn play(&mut self, track: Track) -> MusicResult<()> {
        self.ensure_connected()?;
        self.start_track(track).await
    }

    /// Add a track to the end of the queue, starting playback if nothing is playing
    pub async fn enqueue(&mut self, track: Track) -> MusicResult<Enqueued> {
        self.ensure_connected()?;
        self.queue.enqueue(track.clone());
        let position = self.queue.len();
        self.start_if_empty(track, position).await
    }

    /// Add a track to the front of the queue, starting playback if nothing is playing
    pub async fn enqueue_front(&mut self, track: Track) -> MusicResult<Enqueued> {
        self.ensure_connected()?;
        self.queue.enqueue_front(track.clone());
        self.start_if_empty(track, 1).await
    }

    /// Queue every track without starting any of them. Returns how many were added.
    pub fn extend_queue(&mut self, tracks: impl IntoIterator<Item = Track>) -> MusicResult<usize> {
        self.ensure_connected()?;
        let before = self.queue.len();
        for track in tracks {
            self.queue.enqueue(track);
        }
        Ok(self.queue.len() - before)
    }

    /// Start the queue's head if nothing is playing
    pub async fn start_queued(&mut self) -> MusicResult<Option<Track>> {
        self.ensure_connected()?;
        if self.current.is_some() {
            return Ok(None);
        }

        match self.queue.dequeue() {
            Some(head) => {
                self.start_track(head.clone()).await?;
                Ok(Some(head))
            }
            None => Ok(None),
        }
    }

    async fn start_if_empty(&mut self, added: Track, position: usize) -> MusicResult<Enqueued> {
        if self.current.is_some() {
            return Ok(Enqueued::Queued {
                track: added,
                position,
            });
        }

        match self.queue.dequeue() {
            Some(head) => {
                self.start_track(head.clone()).await?;
                Ok(Enqueued::Started(head))
            }
            None => Ok(Enqueued::Queued { track: added, position }),
        }
    }

    /// Skip the current track, moving on to the queue's head if there is one.
    ///
    /// With `expected` set, only that playback is skipped: if it already ended the call
    /// fails with [`MusicError::TrackChanged`] and nothing moves.
    pub async fn skip(&mut self, expected: Option<PlaybackId>) -> MusicResult<Skipped> {
        self.ensure_connected()?;
        if let Some(expected) = expected {
            if self.current_playback() != Some(expected) {
                debug!(
                    "Not skipping in guild {}: playback {} already ended",
                    self.guild_id, expected
                );
                return Err(MusicError::TrackChanged);
            }
        }

        let skipped = match &self.current {
            Some(now) => now.track.clone(),
            None => return Err(MusicError::NotPlaying),
        };

        match self.queue.dequeue() {
            Some(next) => {
                self.start_track(next.clone()).await?;
                Ok(Skipped {
                    skipped,
                    next: Some(next),
                })
            }
            None => {
                self.clear_current();
                bounded(self.node_timeout, "stop", self.node.stop(self.guild_id)).await?;
                Ok(Skipped {
                    skipped,
                    next: None,
                })
            }
        }
    }

    pub async fn pause(&mut self) -> MusicResult<()> {
        self.ensure_connected()?;
        if self.state() != PlayerState::Playing {
            return Err(MusicError::NotPlaying);
        }

        bounded(self.node_timeout, "pause", self.node.pause(self.guild_id)).await?;
        self.position = self.position();
        self.position_at_ms = now_ms();
        self.paused = true;
        Ok(())
    }

    pub async fn resume(&mut self) -> MusicResult<()> {
        self.ensure_connected()?;
        if self.state() != PlayerState::Paused {
            return Err(MusicError::NotPaused);
        }

        bounded(self.node_timeout, "resume", self.node.resume(self.guild_id)).await?;
        self.position_at_ms = now_ms();
        self.paused = false;
        Ok(())
    }

    /// Jump to `offset` in the current track. Returns the position actually used.
    pub async fn seek(&mut self, offset: Duration) -> MusicResult<Duration> {
        self.ensure_connected()?;
        let duration = match &self.current {
            Some(now) => now.track.duration(),
            None => return Err(MusicError::NotPlaying),
        };

        let target = offset.min(duration);
        bounded(
            self.node_timeout,
            "seek",
            self.node.seek(self.guild_id, target),
        )
        .await?;

        self.reset_position(target);
        Ok(target)
    }

    pub async fn set_volume(&mut self, volume: i64) -> MusicResult<u8> {
        self.ensure_connected()?;
        let volume = u8::try_from(volume)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or(MusicError::VolumeOutOfRange(volume))?;

        bounded(
            self.node_timeout,
            "set volume",
            self.node.set_volume(self.guild_id, volume),
        )
        .await?;

        self.volume = volume;
        Ok(volume)
    }

    /// Handle the node reporting that `playback` stopped.
    pub async fn track_ended(
        &mut self,
        playback: PlaybackId,
        reason: TrackEndReason,
    ) -> MusicResult<TrackEndOutcome> {
        if self.closed || self.current_playback() != Some(playback) {
            debug!(
                "Ignoring end of stale playback {} in guild {}",
                playback, self.guild_id
            );
            return Ok(TrackEndOutcome::Ignored);
        }

        match reason {
            TrackEndReason::Replaced => Ok(TrackEndOutcome::Ignored),
            TrackEndReason::Stopped | TrackEndReason::Cleanup => {
                self.clear_current();
                Ok(TrackEndOutcome::Stopped)
            }
            TrackEndReason::Failed(reason) => {
                let title = self
                    .current()
                    .map(|t| t.title().to_string())
                    .unwrap_or_default();
                self.clear_current();
                Err(MusicError::PlaybackFailed { title, reason })
            }
            TrackEndReason::Finished => {
                self.clear_current();
                match self.queue.dequeue() {
                    Some(next) => {
                        self.start_track(next.clone()).await?;
                        Ok(TrackEndOutcome::Advanced(next))
                    }
                    None => Ok(TrackEndOutcome::QueueExhausted),
                }
            }
        }
    }

    /// Record a progress report from the node.
    ///
    /// `received_ms` is the local unix millis the report arrived at. The node's own clock
    /// is never compared with ours.
    pub fn update_position(&mut self, position: Duration, received_ms: i64) {
        let Some(now) = &self.current else {
            return;
        };
        if self.closed || received_ms < self.reset_at_ms {
            return;
        }

        let position = position.min(now.track.duration());
        if position >= self.position {
            self.position = position;
            self.position_at_ms = received_ms;
        }
    }

    /// Remove the queued track at a 1-based position
    pub fn remove_queued(&mut self, position: usize) -> MusicResult<Track> {
        self.ensure_connected()?;
        let len = self.queue.len();
        if position == 0 || position > len {
            return Err(MusicError::QueuePosition { position, len });
        }

        self.queue
            .remove(position - 1)
            .ok_or(MusicError::QueuePosition { position, len })
    }

    /// Leave the voice channel and end the session. Calling it again does nothing.
    pub async fn disconnect(&mut self) -> MusicResult<()> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.clear_current();
        self.queue.clear();

        if self.channel_id.take().is_some() {
            bounded(
                self.node_timeout,
                "disconnect",
                self.node.disconnect(self.guild_id),
            )
            .await?;
        }

        info!("Session closed in guild {}", self.guild_id);
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: self.guild_id,
            state: self.state(),
            current: self.current().cloned(),
            position: self.position(),
            volume: self.volume,
            queue: self.queue.snapshot(),
            playback: self.current_playback(),
        }
    }
}
