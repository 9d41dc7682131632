use dashmap::DashMap;
use regex::Regex;
use serenity::model::id::{ChannelId, GuildId};
use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::audio_node::{AudioNode, LoadResult, NodeError, NodeResult, TrackEndReason, TrackResolver};
use super::player_session::{
    Enqueued, PlayerSession, PlayerState, SessionSnapshot, Skipped, TrackEndOutcome,
};
use super::track::{PlaybackId, Track};
use crate::utils::database::{SettingsError, SettingsStore};

/// Errors that can occur during music operations
#[derive(Error, Debug)]
pub enum MusicError {
    #[error("Not in a guild")]
    NotInGuild,

    #[error("You need to be in a voice channel")]
    UserNotInVoice,

    #[error("I'm not connected to a voice channel.")]
    NotConnected,

    #[error("Already connected to <#{0}>")]
    AlreadyConnected(ChannelId),

    #[error("I'm not playing anything.")]
    NotPlaying,

    #[error("Playback is not paused")]
    NotPaused,

    #[error("That track has already ended")]
    TrackChanged,

    #[error("Volume must be between 0 and 100.")]
    VolumeOutOfRange(i64),

    #[error("No tracks found for `{0}`")]
    NotFound(String),

    #[error("Invalid position {position}. The queue has {len} tracks")]
    QueuePosition { position: usize, len: usize },

    #[error("Audio node did not respond to {action} within {after:?}")]
    NodeTimeout {
        action: &'static str,
        after: Duration,
    },

    #[error("Audio node failed to {action}: {source}")]
    Node {
        action: &'static str,
        #[source]
        source: NodeError,
    },

    #[error("Could not play {title}: {reason}")]
    PlaybackFailed { title: String, reason: String },

    #[error("This player has been shut down")]
    SessionClosed,

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Result type for music operations
pub type MusicResult<T> = Result<T, MusicError>;

/// Run a node request with an upper bound on how long it may take.
pub(super) async fn bounded<T>(
    limit: Duration,
    action: &'static str,
    request: impl Future<Output = NodeResult<T>>,
) -> MusicResult<T> {
    match tokio::time::timeout(limit, request).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(MusicError::Node { action, source }),
        Err(_) => Err(MusicError::NodeTimeout {
            action,
            after: limit,
        }),
    }
}

/// Guild setting holding the persisted player volume
pub const VOLUME_SETTING: &str = "volume";

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(?:www\.)?\S+$").expect("Invalid URL regex"));

pub type SessionHandle = Arc<Mutex<PlayerSession>>;

type SessionSlot = Arc<OnceCell<SessionHandle>>;

/// Owns every live session, at most one per guild
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionSlot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the guild's session, building it with `create` if there is none.
    ///
    /// Concurrent callers for the same guild share one construction. If `create` fails
    /// the slot is left empty so a later call can try again.
    pub async fn get_or_create<F, Fut>(&self, guild_id: GuildId, create: F) -> MusicResult<SessionHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MusicResult<PlayerSession>>,
    {
        let slot = self.sessions.entry(guild_id).or_default().value().clone();

        let result = slot
            .get_or_try_init(|| async {
                create()
                    .await
                    .map(|session| Arc::new(Mutex::new(session)))
            })
            .await
            .cloned();

        if result.is_err() {
            self.sessions.remove_if(&guild_id, |_, existing| {
                Arc::ptr_eq(existing, &slot) && !existing.initialized()
            });
        }

        result
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .get(&guild_id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Take the guild's session out of the registry
    pub fn remove(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .remove_if(&guild_id, |_, slot| slot.initialized())
            .and_then(|(_, slot)| slot.get().cloned())
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.get(guild_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.iter().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Player behaviour shared by every session
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub node_timeout: Duration,
    pub default_volume: u8,
    pub leave_when_finished: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(5),
            default_volume: 25,
            leave_when_finished: true,
        }
    }
}

/// Where a newly requested track goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Replace whatever is playing
    Now,
    /// Front of the queue
    Next,
    /// End of the queue
    Last,
}

/// Who asked for playback, and from where
#[derive(Debug, Clone, Copy)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    /// The requesting user's voice channel, if they are in one
    pub voice_channel: Option<ChannelId>,
    /// Channel the command was used in
    pub text_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistQueued {
    pub name: String,
    pub count: usize,
    pub started: Option<Track>,
    /// Why the first track could not be started; the rest stay queued
    pub start_failed: Option<String>,
}

/// Entry point for every music operation: resolves tracks, finds or creates the
/// guild's session and applies the requested change to it.
pub struct MusicManager {
    sessions: SessionRegistry,
    node: Arc<dyn AudioNode>,
    resolver: Arc<dyn TrackResolver>,
    settings: Arc<dyn SettingsStore>,
    options: PlayerOptions,
    // Playback ids for every session this manager creates
    playbacks: Arc<AtomicU64>,
}

impl MusicManager {
    pub fn new(
        node: Arc<dyn AudioNode>,
        resolver: Arc<dyn TrackResolver>,
        settings: Arc<dyn SettingsStore>,
        options: PlayerOptions,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            node,
            resolver,
            settings,
            options,
            playbacks: Arc::default(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.options
    }

    fn identifier(query: &str) -> String {
        let query = query.trim();
        if URL_REGEX.is_match(query) {
            query.to_string()
        } else {
            format!("ytsearch:{}", query)
        }
    }

    async fn load(&self, query: &str) -> MusicResult<LoadResult> {
        let identifier = Self::identifier(query);
        debug!("Resolving {}", identifier);
        bounded(self.options.node_timeout, "search", self.resolver.load(&identifier)).await
    }

    /// Find a single track for a URL or free-text search
    pub async fn search(&self, query: &str) -> MusicResult<Track> {
        let track = match self.load(query).await? {
            LoadResult::Track(track) => Some(track),
            LoadResult::Playlist { tracks, .. } | LoadResult::Search(tracks) => {
                tracks.into_iter().next()
            }
            LoadResult::Empty => None,
        };

        track.ok_or_else(|| MusicError::NotFound(query.to_string()))
    }

    /// Find every track of a playlist (or every search result)
    pub async fn search_playlist(&self, query: &str) -> MusicResult<(String, Vec<Track>)> {
        let (name, tracks) = match self.load(query).await? {
            LoadResult::Playlist { name, tracks } => (name, tracks),
            LoadResult::Search(tracks) => (format!("Results for {}", query), tracks),
            LoadResult::Track(track) => (track.title().to_string(), vec![track]),
            LoadResult::Empty => (String::new(), Vec::new()),
        };

        if tracks.is_empty() {
            return Err(MusicError::NotFound(query.to_string()));
        }
        Ok((name, tracks))
    }

    /// The guild's saved volume, or the configured default
    pub fn default_volume(&self, guild_id: GuildId) -> MusicResult<u8> {
        let saved = self.settings.get_setting(guild_id, VOLUME_SETTING)?;
        Ok(saved
            .and_then(|value| value.parse::<u8>().ok())
            .filter(|volume| *volume <= 100)
            .unwrap_or(self.options.default_volume))
    }

    /// Existing session for the guild, or a new one joined to the requester's channel
    async fn session_for(&self, request: &PlayRequest) -> MusicResult<SessionHandle> {
        if let Some(handle) = self.sessions.get(request.guild_id) {
            return Ok(handle);
        }

        let voice_channel = request.voice_channel.ok_or(MusicError::UserNotInVoice)?;
        let volume = self.default_volume(request.guild_id)?;
        let node = Arc::clone(&self.node);
        let timeout = self.options.node_timeout;
        let guild_id = request.guild_id;
        let text_channel = request.text_channel;
        let playbacks = Arc::clone(&self.playbacks);

        self.sessions
            .get_or_create(guild_id, || async move {
                let mut session = PlayerSession::new(guild_id, Arc::clone(&node), timeout)
                    .with_playback_ids(playbacks);
                session.set_text_channel(text_channel);

                if let Err(e) = session.connect(voice_channel).await {
                    if let Err(cleanup) = bounded(timeout, "disconnect", node.disconnect(guild_id)).await {
                        warn!("Failed to clean up voice in guild {}: {}", guild_id, cleanup);
                    }
                    return Err(e);
                }

                if let Err(e) = session.set_volume(i64::from(volume)).await {
                    warn!("Failed to apply volume {} in guild {}: {}", volume, guild_id, e);
                }

                Ok(session)
            })
            .await
    }

    fn existing(&self, guild_id: GuildId) -> MusicResult<SessionHandle> {
        self.sessions.get(guild_id).ok_or(MusicError::NotConnected)
    }

    /// Resolve `query` and hand it to the guild's session
    pub async fn play(&self, request: PlayRequest, query: &str, mode: QueueMode) -> MusicResult<Enqueued> {
        let track = self.search(query).await?;
        let handle = self.session_for(&request).await?;
        let mut session = handle.lock().await;
        session.set_text_channel(request.text_channel);

        let result = match mode {
            QueueMode::Now => {
                session.play(track.clone()).await?;
                Enqueued::Started(track)
            }
            QueueMode::Next => session.enqueue_front(track).await?,
            QueueMode::Last => session.enqueue(track).await?,
        };

        info!("{:?} in guild {} ({:?})", result, request.guild_id, mode);
        Ok(result)
    }

    /// Queue every track of a playlist, then start the first one if nothing is playing.
    ///
    /// A track that fails to start does not undo the queueing; the failure is reported in
    /// [`PlaylistQueued::start_failed`].
    pub async fn enqueue_playlist(&self, request: PlayRequest, query: &str) -> MusicResult<PlaylistQueued> {
        let (name, tracks) = self.search_playlist(query).await?;
        let handle = self.session_for(&request).await?;
        let mut session = handle.lock().await;
        session.set_text_channel(request.text_channel);

        let count = session.extend_queue(tracks)?;
        let (started, start_failed) = match session.start_queued().await {
            Ok(started) => (started, None),
            Err(e) => {
                warn!("Playlist {} could not start in guild {}: {}", name, request.guild_id, e);
                (None, Some(e.to_string()))
            }
        };

        info!("Queued {} tracks from {} in guild {}", count, name, request.guild_id);
        Ok(PlaylistQueued {
            name,
            count,
            started,
            start_failed,
        })
    }

    /// Skip the current track. With `expected` set, only that playback is skipped.
    pub async fn skip(&self, guild_id: GuildId, expected: Option<PlaybackId>) -> MusicResult<Skipped> {
        let handle = self.existing(guild_id)?;
        let mut session = handle.lock().await;
        session.skip(expected).await
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<Track> {
        let handle = self.existing(guild_id)?;
        let mut session = handle.lock().await;
        session.pause().await?;
        session.current().cloned().ok_or(MusicError::NotPlaying)
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<Track> {
        let handle = self.existing(guild_id)?;
        let mut session = handle.lock().await;
        session.resume().await?;
        session.current().cloned().ok_or(MusicError::NotPlaying)
    }

    /// Pause when playing, resume when paused
    pub async fn toggle_pause(&self, guild_id: GuildId) -> MusicResult<PlayerState> {
        let handle = self.existing(guild_id)?;
        let mut session = handle.lock().await;
        match session.state() {
            PlayerState::Paused => session.resume().await?,
            _ => session.pause().await?,
        }
        Ok(session.state())
    }

    pub async fn seek(&self, guild_id: GuildId, offset: Duration) -> MusicResult<Duration> {
        let handle = self.existing(guild_id)?;
        let mut session = handle.lock().await;
        session.seek(offset).await
    }

    /// Apply `volume` to the live session, if any, and save it for the guild
    pub async fn set_volume(&self, guild_id: GuildId, volume: i64) -> MusicResult<u8> {
        if !(0..=100).contains(&volume) {
            return Err(MusicError::VolumeOutOfRange(volume));
        }

        let applied = match self.sessions.get(guild_id) {
            Some(handle) => handle.lock().await.set_volume(volume).await?,
            None => volume as u8,
        };

        self.settings
            .set_setting(guild_id, VOLUME_SETTING, &applied.to_string())?;
        Ok(applied)
    }

    /// Remove the queued track at a 1-based position
    pub async fn remove(&self, guild_id: GuildId, position: usize) -> MusicResult<Track> {
        let handle = self.existing(guild_id)?;
        let mut session = handle.lock().await;
        session.remove_queued(position)
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> SessionSnapshot {
        match self.sessions.get(guild_id) {
            Some(handle) => handle.lock().await.snapshot(),
            None => SessionSnapshot::idle(guild_id),
        }
    }

    /// Text channel the guild's session announces in
    pub async fn text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let handle = self.sessions.get(guild_id)?;
        let session = handle.lock().await;
        session.text_channel()
    }

    /// Voice channel the guild's session is connected to
    pub async fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let handle = self.sessions.get(guild_id)?;
        let session = handle.lock().await;
        session.channel_id()
    }

    /// Stop playback, clear the queue and leave the voice channel
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        if self.teardown(guild_id).await? {
            Ok(())
        } else {
            Err(MusicError::NotConnected)
        }
    }

    /// Remove and disconnect the guild's session. Returns whether there was one.
    pub async fn teardown(&self, guild_id: GuildId) -> MusicResult<bool> {
        let Some(handle) = self.sessions.remove(guild_id) else {
            return Ok(false);
        };

        info!("Tearing down session in guild {}", guild_id);
        handle.lock().await.disconnect().await?;
        Ok(true)
    }

    /// Feed a track-ended notification to the guild's session.
    ///
    /// Leaves the voice channel when the queue runs out and the player is configured to.
    pub async fn track_ended(
        &self,
        guild_id: GuildId,
        playback: PlaybackId,
        reason: TrackEndReason,
    ) -> MusicResult<TrackEndOutcome> {
        let Some(handle) = self.sessions.get(guild_id) else {
            return Ok(TrackEndOutcome::Ignored);
        };

        let mut session = handle.lock().await;
        let outcome = session.track_ended(playback, reason).await?;

        if outcome == TrackEndOutcome::QueueExhausted && self.options.leave_when_finished {
            self.sessions.remove(guild_id);
            session.disconnect().await?;
        }

        Ok(outcome)
    }

    pub async fn update_position(&self, guild_id: GuildId, position: Duration, received_ms: i64) {
        if let Some(handle) = self.sessions.get(guild_id) {
            handle.lock().await.update_position(position, received_ms);
        }
    }
}
