//! Stand-ins for the audio node, the track resolver and the settings store

use async_trait::async_trait;
use mockall::mock;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pibot::commands::music::utils::audio_node::{
    AudioNode, LoadResult, NodeError, NodeResult, TrackResolver,
};
use pibot::commands::music::utils::track::{PlaybackId, Track};
use pibot::utils::database::{SettingsResult, SettingsStore};

/// One directive received by [`FakeNode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    Connect(GuildId, ChannelId),
    Play(GuildId, String, PlaybackId),
    Stop(GuildId),
    Pause(GuildId),
    Resume(GuildId),
    Seek(GuildId, Duration),
    Volume(GuildId, u8),
    Disconnect(GuildId),
}

/// In-memory audio node that records every directive it gets
#[derive(Default)]
pub struct FakeNode {
    calls: Mutex<Vec<NodeCall>>,
    hang_play: AtomicBool,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    fail_play: Mutex<Option<String>>,
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: NodeCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Titles passed to `play`, in order
    pub fn played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NodeCall::Play(_, title, _) => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: impl Fn(&NodeCall) -> bool) -> usize {
        self.calls().iter().filter(|call| wanted(call)).count()
    }

    /// Never confirm a play request
    pub fn hang_play(&self, hang: bool) {
        self.hang_play.store(hang, Ordering::SeqCst);
    }

    /// Report every play request as failed with `reason`
    pub fn fail_play(&self, reason: Option<&str>) {
        *self.fail_play.lock().unwrap() = reason.map(str::to_string);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioNode for FakeNode {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> NodeResult<()> {
        self.record(NodeCall::Connect(guild_id, channel_id));
        tokio::task::yield_now().await;
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(NodeError::Voice("voice server refused the connection".into()));
        }
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, track: &Track, playback: PlaybackId) -> NodeResult<()> {
        self.record(NodeCall::Play(guild_id, track.title().to_string(), playback));
        // Let other tasks reach the session lock while the start is in flight
        tokio::task::yield_now().await;

        if self.hang_play.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failure = self.fail_play.lock().unwrap().clone();
        match failure {
            Some(reason) => Err(NodeError::TrackFailed(reason)),
            None => Ok(()),
        }
    }

    async fn stop(&self, guild_id: GuildId) -> NodeResult<()> {
        self.record(NodeCall::Stop(guild_id));
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> NodeResult<()> {
        self.record(NodeCall::Pause(guild_id));
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> NodeResult<()> {
        self.record(NodeCall::Resume(guild_id));
        Ok(())
    }

    async fn seek(&self, guild_id: GuildId, position: Duration) -> NodeResult<()> {
        self.record(NodeCall::Seek(guild_id, position));
        Ok(())
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u8) -> NodeResult<()> {
        self.record(NodeCall::Volume(guild_id, volume));
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> NodeResult<()> {
        self.record(NodeCall::Disconnect(guild_id));
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(NodeError::Rejected("404 Not Found: player not found".into()));
        }
        Ok(())
    }
}

mock! {
    pub Resolver {}

    #[async_trait]
    impl TrackResolver for Resolver {
        async fn load(&self, identifier: &str) -> NodeResult<LoadResult>;
    }
}

mock! {
    pub Settings {}

    impl SettingsStore for Settings {
        fn get_setting(&self, guild_id: GuildId, key: &str) -> SettingsResult<Option<String>>;
        fn set_setting(&self, guild_id: GuildId, key: &str, value: &str) -> SettingsResult<()>;
    }
}

/// Resolver that answers searches for the given tracks by title and URL lookups by uri
pub fn resolver_for(tracks: Vec<Track>) -> MockResolver {
    let mut resolver = MockResolver::new();
    resolver.expect_load().returning(move |identifier| {
        let found = match identifier.strip_prefix("ytsearch:") {
            Some(query) => tracks.iter().find(|t| t.title() == query),
            None => tracks.iter().find(|t| t.uri() == identifier),
        };
        Ok(match found {
            Some(track) => LoadResult::Search(vec![track.clone()]),
            None => LoadResult::Empty,
        })
    });
    resolver
}

/// Resolver that must not be consulted
pub fn unused_resolver() -> MockResolver {
    let mut resolver = MockResolver::new();
    resolver.expect_load().never();
    resolver
}
