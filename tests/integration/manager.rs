use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use pibot::commands::music::utils::audio_node::{LoadResult, TrackEndReason};
use pibot::commands::music::utils::music_manager::{
    MusicError, MusicManager, PlayRequest, PlayerOptions, PlaylistQueued, QueueMode, VOLUME_SETTING,
};
use pibot::commands::music::utils::player_session::{Enqueued, PlayerState, TrackEndOutcome};
use pibot::commands::music::utils::track::PlaybackId;
use pibot::utils::database::SettingsStore;

use crate::common::fixtures::{GUILD, OTHER_GUILD, TEXT, VOICE, request, request_without_voice, track};
use crate::common::mocks::{FakeNode, MockResolver, MockSettings, NodeCall, resolver_for, unused_resolver};
use crate::common::{manager, manager_with, manager_with_settings, test_options};

fn catalogue() -> MockResolver {
    resolver_for(vec![
        track("Alpha", 180),
        track("Bravo", 120),
        track("Charlie", 90),
        track("Delta", 60),
    ])
}

async fn current_playback(music: &MusicManager) -> PlaybackId {
    let handle = music.sessions().get(GUILD).expect("session exists");
    let session = handle.lock().await;
    session.current_playback().expect("a track is playing")
}

#[tokio::test]
async fn test_first_play_joins_requester_channel() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());

    let result = music.play(request(), "Alpha", QueueMode::Last).await.unwrap();

    assert_eq!(result, Enqueued::Started(track("Alpha", 180)));
    assert_eq!(
        node.calls(),
        vec![
            NodeCall::Connect(GUILD, VOICE),
            NodeCall::Volume(GUILD, 25),
            NodeCall::Play(GUILD, "Alpha".into(), PlaybackId(1)),
        ]
    );
    assert_eq!(music.voice_channel(GUILD).await, Some(VOICE));
    assert_eq!(music.text_channel(GUILD).await, Some(TEXT));
}

#[tokio::test]
async fn test_play_without_voice_channel() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());

    let result = music.play(request_without_voice(), "Alpha", QueueMode::Last).await;

    assert_matches!(result, Err(MusicError::UserNotInVoice));
    assert!(music.sessions().is_empty());
    assert!(node.calls().is_empty());
}

#[tokio::test]
async fn test_nothing_found() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());

    let result = music.play(request(), "no such song", QueueMode::Last).await;

    assert_matches!(result, Err(MusicError::NotFound(query)) if query == "no such song");
    assert!(music.sessions().is_empty());
}

#[tokio::test]
async fn test_free_text_becomes_a_search() {
    let node = FakeNode::new();
    let mut resolver = MockResolver::new();
    resolver
        .expect_load()
        .withf(|identifier| identifier == "ytsearch:never gonna give you up")
        .times(1)
        .returning(|_| Ok(LoadResult::Search(vec![track("Never Gonna Give You Up", 213)])));
    let music = manager(&node, resolver);

    let found = music.search("  never gonna give you up ").await.unwrap();

    assert_eq!(found.title(), "Never Gonna Give You Up");
}

#[tokio::test]
async fn test_urls_are_loaded_directly() {
    let node = FakeNode::new();
    let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
    let mut resolver = MockResolver::new();
    resolver
        .expect_load()
        .withf(move |identifier| identifier == url)
        .times(1)
        .returning(|_| Ok(LoadResult::Track(track("Never Gonna Give You Up", 213))));
    let music = manager(&node, resolver);

    assert_eq!(music.search(url).await.unwrap().title(), "Never Gonna Give You Up");
}

#[tokio::test]
async fn test_queue_modes() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());

    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    assert_matches!(
        music.play(request(), "Bravo", QueueMode::Last).await,
        Ok(Enqueued::Queued { position: 1, .. })
    );
    assert_matches!(
        music.play(request(), "Charlie", QueueMode::Next).await,
        Ok(Enqueued::Queued { position: 1, .. })
    );
    assert_eq!(
        music.play(request(), "Delta", QueueMode::Now).await.unwrap(),
        Enqueued::Started(track("Delta", 60))
    );

    let snapshot = music.snapshot(GUILD).await;
    let queued: Vec<_> = snapshot.queue.iter().map(|t| t.title()).collect();
    assert_eq!(snapshot.current.as_ref().map(|t| t.title()), Some("Delta"));
    assert_eq!(queued, vec!["Charlie", "Bravo"]);
    assert_eq!(node.count(|c| matches!(c, NodeCall::Connect(..))), 1);
}

#[tokio::test]
async fn test_concurrent_first_plays_share_a_session() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());

    let (first, second) = tokio::join!(
        music.play(request(), "Alpha", QueueMode::Last),
        music.play(request(), "Bravo", QueueMode::Last),
    );

    assert_matches!(first, Ok(Enqueued::Started(_)));
    assert_matches!(second, Ok(Enqueued::Queued { position: 1, .. }));
    assert_eq!(node.count(|c| matches!(c, NodeCall::Connect(..))), 1);
    assert_eq!(music.sessions().len(), 1);
}

#[tokio::test]
async fn test_failed_connect_leaves_no_session() {
    let node = FakeNode::new();
    node.fail_connect(true);
    let music = manager(&node, catalogue());

    let result = music.play(request(), "Alpha", QueueMode::Last).await;

    assert_matches!(result, Err(MusicError::Node { action: "connect", .. }));
    assert!(music.sessions().is_empty());
    assert_eq!(node.calls().last(), Some(&NodeCall::Disconnect(GUILD)));
}

#[tokio::test]
async fn test_playlist_is_queued_in_order() {
    let node = FakeNode::new();
    let tracks = vec![track("Alpha", 180), track("Bravo", 120), track("Charlie", 90)];
    let mut resolver = MockResolver::new();
    let listed = tracks.clone();
    resolver.expect_load().returning(move |_| {
        Ok(LoadResult::Playlist {
            name: "Road Trip".into(),
            tracks: listed.clone(),
        })
    });
    let music = manager(&node, resolver);

    let queued = music
        .enqueue_playlist(request(), "https://www.youtube.com/playlist?list=PL123")
        .await
        .unwrap();

    assert_eq!(
        queued,
        PlaylistQueued {
            name: "Road Trip".into(),
            count: 3,
            started: Some(tracks[0].clone()),
            start_failed: None,
        }
    );
    let snapshot = music.snapshot(GUILD).await;
    assert_eq!(snapshot.queue.len(), 2);
    assert_eq!(snapshot.queue.total_duration(), Duration::from_secs(210));
}

#[tokio::test]
async fn test_playlist_start_failure_keeps_tracks_queued() {
    let node = FakeNode::new();
    node.fail_play(Some("blocked in your country"));
    let mut resolver = MockResolver::new();
    resolver.expect_load().returning(|_| {
        Ok(LoadResult::Playlist {
            name: "Road Trip".into(),
            tracks: vec![track("Alpha", 180), track("Bravo", 120), track("Charlie", 90)],
        })
    });
    let music = manager(&node, resolver);

    let queued = music.enqueue_playlist(request(), "road trip").await.unwrap();

    assert_eq!(queued.count, 3);
    assert_eq!(queued.started, None);
    assert_matches!(queued.start_failed, Some(reason) if reason.contains("blocked in your country"));
    let snapshot = music.snapshot(GUILD).await;
    assert_eq!(snapshot.state, PlayerState::ConnectedEmpty);
    let titles: Vec<_> = snapshot.queue.iter().map(|t| t.title().to_string()).collect();
    assert_eq!(titles, vec!["Bravo", "Charlie"]);
}

#[tokio::test]
async fn test_search_results_as_playlist() {
    let node = FakeNode::new();
    let mut resolver = MockResolver::new();
    resolver
        .expect_load()
        .returning(|_| Ok(LoadResult::Search(vec![track("Lofi One", 120), track("Lofi Two", 140)])));
    let music = manager(&node, resolver);

    let (name, tracks) = music.search_playlist("lofi").await.unwrap();

    assert_eq!(name, "Results for lofi");
    assert_eq!(tracks.len(), 2);
}

#[tokio::test]
async fn test_empty_playlist_is_not_found() {
    let node = FakeNode::new();
    let mut resolver = MockResolver::new();
    resolver.expect_load().returning(|_| Ok(LoadResult::Empty));
    let music = manager(&node, resolver);

    assert_err!(music.enqueue_playlist(request(), "lofi").await);
    assert!(music.sessions().is_empty());
}

#[tokio::test]
async fn test_commands_without_session() {
    let node = FakeNode::new();
    let music = manager(&node, unused_resolver());

    assert_matches!(music.skip(GUILD, None).await, Err(MusicError::NotConnected));
    assert_matches!(music.pause(GUILD).await, Err(MusicError::NotConnected));
    assert_matches!(music.resume(GUILD).await, Err(MusicError::NotConnected));
    assert_matches!(music.toggle_pause(GUILD).await, Err(MusicError::NotConnected));
    assert_matches!(music.seek(GUILD, Duration::from_secs(5)).await, Err(MusicError::NotConnected));
    assert_matches!(music.remove(GUILD, 1).await, Err(MusicError::NotConnected));
    assert_matches!(music.stop(GUILD).await, Err(MusicError::NotConnected));

    assert_eq!(music.snapshot(GUILD).await.state, PlayerState::Idle);
    assert!(node.calls().is_empty());
}

#[tokio::test]
async fn test_toggle_pause() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());
    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();

    assert_eq!(music.toggle_pause(GUILD).await.unwrap(), PlayerState::Paused);
    assert_eq!(music.toggle_pause(GUILD).await.unwrap(), PlayerState::Playing);
}

#[tokio::test]
async fn test_pause_returns_current_track() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());
    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();

    assert_eq!(music.pause(GUILD).await.unwrap().title(), "Alpha");
    assert_eq!(music.resume(GUILD).await.unwrap().title(), "Alpha");
}

#[tokio::test]
async fn test_stop_tears_down() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());
    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    music.play(request(), "Bravo", QueueMode::Last).await.unwrap();

    assert_ok!(music.stop(GUILD).await);

    assert!(music.sessions().is_empty());
    assert_eq!(node.calls().last(), Some(&NodeCall::Disconnect(GUILD)));
    assert_matches!(music.stop(GUILD).await, Err(MusicError::NotConnected));
    assert_eq!(music.snapshot(GUILD).await.state, PlayerState::Idle);
}

#[tokio::test]
async fn test_play_after_stop_starts_fresh() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());
    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    music.play(request(), "Bravo", QueueMode::Last).await.unwrap();
    music.stop(GUILD).await.unwrap();

    music.play(request(), "Charlie", QueueMode::Last).await.unwrap();

    let snapshot = music.snapshot(GUILD).await;
    assert_eq!(snapshot.current.map(|t| t.title().to_string()), Some("Charlie".into()));
    assert!(snapshot.queue.is_empty());
    assert_eq!(node.count(|c| matches!(c, NodeCall::Connect(..))), 2);
}

#[tokio::test]
async fn test_late_end_of_torn_down_session_is_ignored() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());
    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    let alpha = current_playback(&music).await;
    music.stop(GUILD).await.unwrap();

    music.play(request(), "Bravo", QueueMode::Last).await.unwrap();
    assert_ne!(current_playback(&music).await, alpha);

    for reason in [TrackEndReason::Finished, TrackEndReason::Stopped, TrackEndReason::Cleanup] {
        let outcome = music.track_ended(GUILD, alpha, reason).await.unwrap();
        assert_eq!(outcome, TrackEndOutcome::Ignored);
    }

    let snapshot = music.snapshot(GUILD).await;
    assert_eq!(snapshot.state, PlayerState::Playing);
    assert_eq!(snapshot.current.map(|t| t.title().to_string()), Some("Bravo".into()));
    assert_eq!(node.count(|c| matches!(c, NodeCall::Disconnect(..))), 1);
}

#[tokio::test]
async fn test_playback_ids_differ_across_guilds() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());
    let other = PlayRequest {
        guild_id: OTHER_GUILD,
        ..request()
    };

    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    music.play(other, "Bravo", QueueMode::Last).await.unwrap();

    let ids: Vec<PlaybackId> = node
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            NodeCall::Play(_, _, playback) => Some(playback),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec![PlaybackId(1), PlaybackId(2)]);
}

#[tokio::test]
async fn test_queue_exhausted_leaves_channel() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());
    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    let playback = current_playback(&music).await;

    let outcome = music
        .track_ended(GUILD, playback, TrackEndReason::Finished)
        .await
        .unwrap();

    assert_eq!(outcome, TrackEndOutcome::QueueExhausted);
    assert!(music.sessions().is_empty());
    assert_eq!(node.calls().last(), Some(&NodeCall::Disconnect(GUILD)));
}

#[tokio::test]
async fn test_queue_exhausted_stays_when_configured() {
    let node = FakeNode::new();
    let options = PlayerOptions {
        leave_when_finished: false,
        ..test_options()
    };
    let music = manager_with(&node, catalogue(), options);
    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    let playback = current_playback(&music).await;

    music
        .track_ended(GUILD, playback, TrackEndReason::Finished)
        .await
        .unwrap();

    assert_eq!(music.snapshot(GUILD).await.state, PlayerState::ConnectedEmpty);
    assert_eq!(node.count(|c| matches!(c, NodeCall::Disconnect(..))), 0);
}

#[tokio::test]
async fn test_track_end_for_unknown_guild_is_ignored() {
    let node = FakeNode::new();
    let music = manager(&node, unused_resolver());

    let outcome = music
        .track_ended(GUILD, PlaybackId(7), TrackEndReason::Finished)
        .await
        .unwrap();

    assert_eq!(outcome, TrackEndOutcome::Ignored);
}

#[tokio::test]
async fn test_saved_volume_is_applied_and_updated() {
    let node = FakeNode::new();
    let mut settings = MockSettings::new();
    settings
        .expect_get_setting()
        .withf(|guild_id, key| *guild_id == GUILD && key == VOLUME_SETTING)
        .returning(|_, _| Ok(Some("40".into())));
    settings
        .expect_set_setting()
        .withf(|guild_id, key, value| *guild_id == GUILD && key == VOLUME_SETTING && value == "70")
        .times(1)
        .returning(|_, _, _| Ok(()));
    let settings: Arc<dyn SettingsStore> = Arc::new(settings);
    let music = manager_with_settings(&node, catalogue(), settings, test_options());

    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    assert_eq!(music.snapshot(GUILD).await.volume, 40);

    assert_matches!(music.set_volume(GUILD, 150).await, Err(MusicError::VolumeOutOfRange(150)));
    assert_eq!(music.set_volume(GUILD, 70).await.unwrap(), 70);

    assert_eq!(music.snapshot(GUILD).await.volume, 70);
    assert_eq!(node.calls().last(), Some(&NodeCall::Volume(GUILD, 70)));
}

#[tokio::test]
async fn test_volume_saved_without_session() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());

    assert_eq!(music.set_volume(GUILD, 60).await.unwrap(), 60);
    assert_eq!(music.default_volume(GUILD).unwrap(), 60);

    music.play(request(), "Alpha", QueueMode::Last).await.unwrap();
    assert!(node.calls().contains(&NodeCall::Volume(GUILD, 60)));
}

#[tokio::test]
async fn test_remove_from_queue() {
    let node = FakeNode::new();
    let music = manager(&node, catalogue());
    for title in ["Alpha", "Bravo", "Charlie"] {
        music.play(request(), title, QueueMode::Last).await.unwrap();
    }

    assert_eq!(music.remove(GUILD, 1).await.unwrap().title(), "Bravo");
    assert_matches!(
        music.remove(GUILD, 5).await,
        Err(MusicError::QueuePosition { position: 5, len: 1 })
    );
}
