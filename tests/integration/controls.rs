use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use std::sync::Arc;

use pibot::commands::music::utils::button_controls::PlayerControl;
use pibot::commands::music::utils::button_handlers::apply_control;
use pibot::commands::music::utils::embedded_messages::render;
use pibot::commands::music::utils::music_manager::{MusicError, MusicManager, QueueMode};
use pibot::commands::music::utils::audio_node::TrackEndReason;
use pibot::commands::music::utils::player_session::PlayerState;

use crate::common::fixtures::{GUILD, request, track};
use crate::common::manager;
use crate::common::mocks::{FakeNode, NodeCall, resolver_for};

struct Player {
    node: Arc<FakeNode>,
    music: MusicManager,
}

#[fixture]
fn player() -> Player {
    let node = FakeNode::new();
    let music = manager(
        &node,
        resolver_for(vec![track("Alpha", 180), track("Bravo", 120), track("Charlie", 90)]),
    );
    Player { node, music }
}

async fn start(player: &Player, titles: &[&str]) {
    for title in titles {
        player
            .music
            .play(request(), title, QueueMode::Last)
            .await
            .unwrap();
    }
}

#[rstest]
#[tokio::test]
async fn test_play_pause_button_toggles(player: Player) {
    start(&player, &["Alpha"]).await;

    let paused = apply_control(&player.music, GUILD, PlayerControl::PlayPause, None).await.unwrap();
    assert_eq!(paused.state, PlayerState::Paused);
    assert_eq!(render(&paused, false).title, "⏸️ Paused");

    let resumed = apply_control(&player.music, GUILD, PlayerControl::PlayPause, None).await.unwrap();
    assert_eq!(resumed.state, PlayerState::Playing);
    assert_eq!(render(&resumed, false).title, "🎵 Now Playing");

    assert_eq!(player.node.count(|c| *c == NodeCall::Pause(GUILD)), 1);
    assert_eq!(player.node.count(|c| *c == NodeCall::Resume(GUILD)), 1);
}

#[rstest]
#[tokio::test]
async fn test_skip_button_advances(player: Player) {
    start(&player, &["Alpha", "Bravo", "Charlie"]).await;

    let snapshot = apply_control(&player.music, GUILD, PlayerControl::Skip, None).await.unwrap();

    assert_eq!(snapshot.current.as_ref().map(|t| t.title()), Some("Bravo"));
    let presentation = render(&snapshot, true);
    let queue = presentation.queue.expect("queue is shown");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].title, "Charlie");
    assert_eq!(queue[0].index, 1);
}

#[rstest]
#[tokio::test]
async fn test_stop_button_ends_session(player: Player) {
    start(&player, &["Alpha", "Bravo"]).await;

    let snapshot = apply_control(&player.music, GUILD, PlayerControl::Stop, None).await.unwrap();

    assert_eq!(snapshot.state, PlayerState::Idle);
    assert!(player.music.sessions().is_empty());
    let presentation = render(&snapshot, false);
    assert_eq!(presentation.title, "🔇 Nothing playing");
    assert!(presentation.controls.iter().all(|button| {
        button.control == PlayerControl::Refresh || button.disabled
    }));
}

#[rstest]
#[tokio::test]
async fn test_refresh_changes_nothing(player: Player) {
    start(&player, &["Alpha", "Bravo"]).await;
    player.node.clear_calls();

    let snapshot = apply_control(&player.music, GUILD, PlayerControl::Refresh, None).await.unwrap();

    assert_eq!(snapshot.state, PlayerState::Playing);
    assert_eq!(snapshot.queue.len(), 1);
    assert!(player.node.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_refresh_without_session(player: Player) {
    let snapshot = apply_control(&player.music, GUILD, PlayerControl::Refresh, None).await.unwrap();

    assert_eq!(snapshot.state, PlayerState::Idle);
    assert!(player.music.sessions().is_empty());
}

#[rstest]
#[case::play_pause(PlayerControl::PlayPause)]
#[case::skip(PlayerControl::Skip)]
#[case::stop(PlayerControl::Stop)]
#[tokio::test]
async fn test_buttons_without_session(player: Player, #[case] control: PlayerControl) {
    let result = apply_control(&player.music, GUILD, control, None).await;

    assert_matches!(result, Err(MusicError::NotConnected));
    assert!(player.node.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_skip_button_on_last_track(player: Player) {
    start(&player, &["Alpha"]).await;

    let snapshot = apply_control(&player.music, GUILD, PlayerControl::Skip, None).await.unwrap();

    assert_eq!(snapshot.state, PlayerState::ConnectedEmpty);
    let skip = render(&snapshot, false)
        .controls
        .into_iter()
        .find(|button| button.control == PlayerControl::Skip)
        .expect("skip button present");
    assert!(skip.disabled);
}

#[rstest]
#[tokio::test]
async fn test_skip_button_for_ended_track_does_nothing(player: Player) {
    start(&player, &["Alpha", "Bravo", "Charlie"]).await;
    let rendered = player.music.snapshot(GUILD).await;
    let alpha = rendered.playback.expect("alpha is playing");
    let custom_id = render(&rendered, false)
        .controls
        .into_iter()
        .find(|button| button.control == PlayerControl::Skip)
        .expect("skip button present")
        .custom_id();
    let (control, playback) = PlayerControl::parse(&custom_id).expect("own button id parses");

    // Alpha ends before the press reaches the session
    player
        .music
        .track_ended(GUILD, alpha, TrackEndReason::Finished)
        .await
        .unwrap();
    let result = apply_control(&player.music, GUILD, control, playback).await;

    assert_matches!(result, Err(MusicError::TrackChanged));
    let snapshot = player.music.snapshot(GUILD).await;
    assert_eq!(snapshot.current.as_ref().map(|t| t.title()), Some("Bravo"));
    assert_eq!(snapshot.queue.len(), 1);
    assert_eq!(player.node.played(), vec!["Alpha", "Bravo"]);
}
