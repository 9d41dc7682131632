//! Client for a Lavalink v4 audio node.
//!
//! Player changes go over REST; track and voice events arrive on the websocket and are
//! forwarded as [`NodeEvent`]s. Discord voice is negotiated through songbird's
//! gateway-only join and the resulting voice session is handed to the node.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::{Value, json};
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::Songbird;
use songbird::error::JoinError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue as WsHeaderValue;
use tracing::{debug, error, info, warn};
use url::Url;

use super::audio_node::{
    AudioNode, LoadResult, NodeError, NodeEvent, NodeResult, TrackEndReason, TrackResolver,
};
use super::track::{PlaybackId, Track};
use crate::config::LavalinkConfig;

const CLIENT_NAME: &str = concat!("pibot/", env!("CARGO_PKG_VERSION"));
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A play request waiting for the node to confirm the track started
struct PendingStart {
    playback: PlaybackId,
    done: oneshot::Sender<NodeResult<()>>,
}

pub struct LavalinkNode {
    http: reqwest::Client,
    rest_url: String,
    ws_url: String,
    password: String,
    user_id: UserId,
    reconnect_attempts: u8,
    session_id: RwLock<Option<String>>,
    pending_starts: DashMap<GuildId, PendingStart>,
    // Last exception per guild, reported with the following load failure
    exceptions: DashMap<GuildId, String>,
    voice: Arc<Songbird>,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl LavalinkNode {
    /// Build a client for the node. Events are delivered on the returned receiver once
    /// [`LavalinkNode::run`] has been started.
    pub fn new(
        config: &LavalinkConfig,
        user_id: UserId,
        voice: Arc<Songbird>,
    ) -> NodeResult<(Arc<Self>, mpsc::UnboundedReceiver<NodeEvent>)> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&config.password).map_err(|e| NodeError::Config(e.to_string()))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(CLIENT_NAME)
            .build()?;

        let (events, receiver) = mpsc::unbounded_channel();

        let node = Self {
            http,
            rest_url: config.rest_url(),
            ws_url: config.websocket_url(),
            password: config.password.clone(),
            user_id,
            reconnect_attempts: config.reconnect_attempts,
            session_id: RwLock::new(None),
            pending_starts: DashMap::new(),
            exceptions: DashMap::new(),
            voice,
            events,
        };

        Ok((Arc::new(node), receiver))
    }

    /// Keep a websocket connection to the node open, reconnecting after failures.
    pub fn run(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let mut failures: u8 = 0;
            loop {
                match node.listen().await {
                    Ok(()) => {
                        warn!("Lavalink websocket closed");
                        failures = 0;
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        error!("Failed to connect to Lavalink ({}/{}): {}", failures, node.reconnect_attempts, e);
                    }
                }

                node.connection_lost().await;

                if failures >= node.reconnect_attempts {
                    error!("Giving up on Lavalink after {} failed attempts", failures);
                    break;
                }

                info!("Reconnecting to Lavalink in {:?}", RECONNECT_DELAY);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    /// Connect once and process messages until the socket closes.
    async fn listen(&self) -> NodeResult<()> {
        let mut request = self.ws_url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", ws_header(&self.password)?);
        headers.insert("User-Id", ws_header(&self.user_id.to_string())?);
        headers.insert("Client-Name", ws_header(CLIENT_NAME)?);

        let (mut stream, _) = connect_async(request).await?;
        info!("Connected to Lavalink at {}", self.ws_url);

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => self.handle_message(&text).await,
                Ok(Message::Close(frame)) => {
                    warn!("Lavalink closed the websocket: {:?}", frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Lavalink websocket error: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    async fn connection_lost(&self) {
        *self.session_id.write().await = None;

        let guilds: Vec<GuildId> = self.pending_starts.iter().map(|entry| *entry.key()).collect();
        for guild_id in guilds {
            if let Some((_, pending)) = self.pending_starts.remove(&guild_id) {
                let _ = pending.done.send(Err(NodeError::NotReady));
            }
        }
    }

    async fn handle_message(&self, text: &str) {
        let message: IncomingMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unreadable Lavalink message: {} ({})", e, text);
                return;
            }
        };

        match message {
            IncomingMessage::Ready {
                session_id,
                resumed,
            } => {
                info!("Lavalink session {} ready (resumed: {})", session_id, resumed);
                *self.session_id.write().await = Some(session_id.clone());
                self.emit(NodeEvent::Ready {
                    session_id,
                    resumed,
                });
            }
            IncomingMessage::PlayerUpdate { guild_id, state } => {
                if let Some(guild_id) = parse_guild_id(&guild_id) {
                    self.emit(NodeEvent::PositionUpdate {
                        guild_id,
                        position: Duration::from_millis(state.position),
                        timestamp_ms: state.time,
                    });
                }
            }
            IncomingMessage::Event(event) => self.handle_event(event),
            IncomingMessage::Unknown => {}
        }
    }

    fn handle_event(&self, event: EventMessage) {
        match event {
            EventMessage::TrackStartEvent(payload) => {
                let Some(guild_id) = parse_guild_id(&payload.guild_id) else {
                    return;
                };
                let playback = payload.track.playback();
                self.resolve_start(guild_id, playback, Ok(()));
                self.emit(NodeEvent::TrackStarted { guild_id, playback });
            }
            EventMessage::TrackEndEvent(payload) => {
                let Some(guild_id) = parse_guild_id(&payload.guild_id) else {
                    return;
                };
                let playback = payload.track.playback();
                let reason = match payload.reason.as_str() {
                    "finished" => TrackEndReason::Finished,
                    "loadFailed" => TrackEndReason::Failed(
                        self.exceptions
                            .remove(&guild_id)
                            .map(|(_, message)| message)
                            .unwrap_or_else(|| "the track could not be loaded".to_string()),
                    ),
                    "replaced" => TrackEndReason::Replaced,
                    "cleanup" => TrackEndReason::Cleanup,
                    _ => TrackEndReason::Stopped,
                };

                if let TrackEndReason::Failed(message) = &reason {
                    self.resolve_start(guild_id, playback, Err(NodeError::TrackFailed(message.clone())));
                }
                self.emit(NodeEvent::TrackEnded {
                    guild_id,
                    playback,
                    reason,
                });
            }
            EventMessage::TrackExceptionEvent(payload) => {
                let Some(guild_id) = parse_guild_id(&payload.guild_id) else {
                    return;
                };
                let message = payload.exception.describe();
                warn!("Track {} failed in guild {}: {}", payload.track.info.title, guild_id, message);
                self.resolve_start(
                    guild_id,
                    payload.track.playback(),
                    Err(NodeError::TrackFailed(message.clone())),
                );
                self.exceptions.insert(guild_id, message);
            }
            EventMessage::TrackStuckEvent(payload) => {
                warn!(
                    "Track {} stuck for {}ms in guild {}",
                    payload.track.info.title, payload.threshold_ms, payload.guild_id
                );
            }
            EventMessage::WebSocketClosedEvent(payload) => {
                let Some(guild_id) = parse_guild_id(&payload.guild_id) else {
                    return;
                };
                self.emit(NodeEvent::VoiceClosed {
                    guild_id,
                    code: payload.code,
                    reason: payload.reason,
                    by_remote: payload.by_remote,
                });
            }
            EventMessage::Unknown => {}
        }
    }

    fn resolve_start(&self, guild_id: GuildId, playback: Option<PlaybackId>, result: NodeResult<()>) {
        let Some(playback) = playback else {
            return;
        };
        if let Some((_, pending)) = self
            .pending_starts
            .remove_if(&guild_id, |_, pending| pending.playback == playback)
        {
            let _ = pending.done.send(result);
        }
    }

    fn emit(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            debug!("Dropping Lavalink event, nobody is listening");
        }
    }

    async fn session_id(&self) -> NodeResult<String> {
        self.session_id
            .read()
            .await
            .clone()
            .ok_or(NodeError::NotReady)
    }

    fn player_url(&self, session_id: &str, guild_id: GuildId) -> String {
        format!(
            "{}/v4/sessions/{}/players/{}",
            self.rest_url, session_id, guild_id
        )
    }

    async fn update_player(&self, guild_id: GuildId, body: Value) -> NodeResult<()> {
        let session_id = self.session_id().await?;
        let url = format!("{}?noReplace=false", self.player_url(&session_id, guild_id));
        debug!("PATCH player {} in guild {}", body, guild_id);

        let response = self.http.patch(url).json(&body).send().await?;
        check(response).await?;
        Ok(())
    }
}

fn ws_header(value: &str) -> NodeResult<WsHeaderValue> {
    WsHeaderValue::from_str(value).map_err(|e| NodeError::Config(e.to_string()))
}

fn parse_guild_id(raw: &str) -> Option<GuildId> {
    raw.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

async fn check(response: reqwest::Response) -> NodeResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NodeError::Rejected(format!("{}: {}", status, body)))
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> NodeResult<()> {
        let session_id = self.session_id().await?;
        let (info, _call) = self
            .voice
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(|e| NodeError::Voice(e.to_string()))?;

        let url = self.player_url(&session_id, guild_id);
        let body = json!({
            "voice": {
                "token": info.token,
                "endpoint": info.endpoint,
                "sessionId": info.session_id,
            }
        });

        let response = self.http.patch(url).json(&body).send().await?;
        check(response).await?;
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, track: &Track, playback: PlaybackId) -> NodeResult<()> {
        let (done, confirmed) = oneshot::channel();
        if let Some(previous) = self
            .pending_starts
            .insert(guild_id, PendingStart { playback, done })
        {
            let _ = previous
                .done
                .send(Err(NodeError::Rejected("replaced by a newer track".to_string())));
        }

        let user_data = json!({ "playback": playback.0 });
        let track_body = match track.encoded() {
            Some(encoded) => json!({ "encoded": encoded, "userData": user_data }),
            None => json!({ "identifier": track.query(), "userData": user_data }),
        };

        let body = json!({ "track": track_body, "position": 0, "paused": false });
        if let Err(e) = self.update_player(guild_id, body).await {
            self.pending_starts
                .remove_if(&guild_id, |_, pending| pending.playback == playback);
            return Err(e);
        }

        match confirmed.await {
            Ok(result) => result,
            Err(_) => Err(NodeError::NotReady),
        }
    }

    async fn stop(&self, guild_id: GuildId) -> NodeResult<()> {
        self.update_player(guild_id, json!({ "track": { "encoded": null } }))
            .await
    }

    async fn pause(&self, guild_id: GuildId) -> NodeResult<()> {
        self.update_player(guild_id, json!({ "paused": true })).await
    }

    async fn resume(&self, guild_id: GuildId) -> NodeResult<()> {
        self.update_player(guild_id, json!({ "paused": false })).await
    }

    async fn seek(&self, guild_id: GuildId, position: Duration) -> NodeResult<()> {
        let millis = u64::try_from(position.as_millis()).unwrap_or(u64::MAX);
        self.update_player(guild_id, json!({ "position": millis }))
            .await
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> NodeResult<()> {
        self.update_player(guild_id, json!({ "volume": volume }))
            .await
    }

    async fn disconnect(&self, guild_id: GuildId) -> NodeResult<()> {
        self.pending_starts.remove(&guild_id);
        self.exceptions.remove(&guild_id);

        if let Ok(session_id) = self.session_id().await {
            let response = self
                .http
                .delete(self.player_url(&session_id, guild_id))
                .send()
                .await?;
            check(response).await?;
        }

        match self.voice.remove(guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(NodeError::Voice(e.to_string())),
        }
    }
}

#[async_trait]
impl TrackResolver for LavalinkNode {
    async fn load(&self, identifier: &str) -> NodeResult<LoadResult> {
        let url = Url::parse_with_params(
            &format!("{}/v4/loadtracks", self.rest_url),
            &[("identifier", identifier)],
        )
        .map_err(|e| NodeError::Config(e.to_string()))?;

        let response = check(self.http.get(url).send().await?).await?;
        let body = response.text().await?;
        let loaded: LoadTracksResponse = serde_json::from_str(&body)?;

        let query = identifier.strip_prefix("ytsearch:").unwrap_or(identifier);
        Ok(match loaded {
            LoadTracksResponse::Track(track) => LoadResult::Track(track.into_track(query)),
            LoadTracksResponse::Playlist(playlist) => LoadResult::Playlist {
                name: playlist.info.name,
                tracks: playlist
                    .tracks
                    .into_iter()
                    .map(|track| track.into_track(query))
                    .collect(),
            },
            LoadTracksResponse::Search(tracks) => LoadResult::Search(
                tracks
                    .into_iter()
                    .map(|track| track.into_track(query))
                    .collect(),
            ),
            LoadTracksResponse::Empty(_) => LoadResult::Empty,
            LoadTracksResponse::Error(exception) => {
                return Err(NodeError::Rejected(exception.describe()));
            }
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "op", rename_all = "camelCase")]
enum IncomingMessage {
    #[serde(rename_all = "camelCase")]
    Ready { session_id: String, resumed: bool },
    #[serde(rename_all = "camelCase")]
    PlayerUpdate {
        guild_id: String,
        state: PlayerUpdateState,
    },
    Event(EventMessage),
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
struct PlayerUpdateState {
    time: i64,
    #[serde(default)]
    position: u64,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum EventMessage {
    TrackStartEvent(TrackStartPayload),
    TrackEndEvent(TrackEndPayload),
    TrackExceptionEvent(TrackExceptionPayload),
    TrackStuckEvent(TrackStuckPayload),
    WebSocketClosedEvent(WebSocketClosedPayload),
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TrackStartPayload {
    guild_id: String,
    track: TrackPayload,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TrackEndPayload {
    guild_id: String,
    track: TrackPayload,
    reason: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TrackExceptionPayload {
    guild_id: String,
    track: TrackPayload,
    exception: ExceptionPayload,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TrackStuckPayload {
    guild_id: String,
    track: TrackPayload,
    threshold_ms: u64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WebSocketClosedPayload {
    guild_id: String,
    code: u16,
    reason: String,
    by_remote: bool,
}

#[derive(Deserialize, Debug)]
struct ExceptionPayload {
    message: Option<String>,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    cause: String,
}

impl ExceptionPayload {
    fn describe(&self) -> String {
        match &self.message {
            Some(message) if !message.is_empty() => message.clone(),
            _ if !self.cause.is_empty() => self.cause.clone(),
            _ => format!("{} failure", self.severity.to_lowercase()),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TrackPayload {
    encoded: String,
    info: TrackInfo,
    #[serde(default)]
    user_data: Value,
}

impl TrackPayload {
    fn playback(&self) -> Option<PlaybackId> {
        self.user_data
            .get("playback")
            .and_then(Value::as_u64)
            .map(PlaybackId)
    }

    fn into_track(self, query: &str) -> Track {
        let duration = if self.info.is_stream {
            Duration::ZERO
        } else {
            Duration::from_millis(self.info.length)
        };

        Track::new(
            self.info.title,
            self.info.uri.unwrap_or_default(),
            duration,
            query,
        )
        .with_encoded(self.encoded)
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TrackInfo {
    title: String,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    is_stream: bool,
    uri: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PlaylistPayload {
    info: PlaylistInfo,
    tracks: Vec<TrackPayload>,
}

#[derive(Deserialize, Debug)]
struct PlaylistInfo {
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
enum LoadTracksResponse {
    Track(TrackPayload),
    Playlist(PlaylistPayload),
    Search(Vec<TrackPayload>),
    Empty(IgnoredAny),
    Error(ExceptionPayload),
}
