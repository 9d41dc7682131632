use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serenity::model::id::GuildId;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pibot::commands::music::utils::music_manager::{MusicError, MusicResult, SessionRegistry};
use pibot::commands::music::utils::player_session::PlayerSession;

use crate::common::NODE_TIMEOUT;
use crate::common::fixtures::{GUILD, OTHER_GUILD};
use crate::common::mocks::FakeNode;

async fn new_session(node: Arc<FakeNode>, guild_id: GuildId) -> MusicResult<PlayerSession> {
    Ok(PlayerSession::new(guild_id, node, NODE_TIMEOUT))
}

#[tokio::test]
async fn test_concurrent_creates_share_one_session() {
    let node = FakeNode::new();
    let registry = SessionRegistry::new();
    let built = AtomicUsize::new(0);

    let (node, counter) = (&node, &built);
    let create = move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        new_session(node.clone(), GUILD).await
    };

    let (first, second) = tokio::join!(
        registry.get_or_create(GUILD, create),
        registry.get_or_create(GUILD, create),
    );

    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_guilds_get_separate_sessions() {
    let node = FakeNode::new();
    let registry = SessionRegistry::new();

    let first = registry
        .get_or_create(GUILD, || new_session(node.clone(), GUILD))
        .await
        .unwrap();
    let second = registry
        .get_or_create(OTHER_GUILD, || new_session(node.clone(), OTHER_GUILD))
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.lock().await.guild_id(), OTHER_GUILD);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_failed_create_leaves_no_session() {
    let node = FakeNode::new();
    let registry = SessionRegistry::new();

    let result = registry
        .get_or_create(GUILD, || async { Err(MusicError::UserNotInVoice) })
        .await;

    assert_matches!(result, Err(MusicError::UserNotInVoice));
    assert!(!registry.contains(GUILD));
    assert!(registry.is_empty());

    // A later attempt builds normally
    registry
        .get_or_create(GUILD, || new_session(node.clone(), GUILD))
        .await
        .unwrap();
    assert!(registry.contains(GUILD));
}

#[tokio::test]
async fn test_get_never_creates() {
    let registry = SessionRegistry::new();

    assert!(registry.get(GUILD).is_none());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_remove_takes_the_session() {
    let node = FakeNode::new();
    let registry = SessionRegistry::new();
    let created = registry
        .get_or_create(GUILD, || new_session(node.clone(), GUILD))
        .await
        .unwrap();

    let removed = registry.remove(GUILD).unwrap();

    assert!(Arc::ptr_eq(&created, &removed));
    assert!(registry.get(GUILD).is_none());
    assert!(registry.remove(GUILD).is_none());
}

#[tokio::test]
async fn test_create_after_remove_builds_a_new_session() {
    let node = FakeNode::new();
    let registry = SessionRegistry::new();

    let old = registry
        .get_or_create(GUILD, || new_session(node.clone(), GUILD))
        .await
        .unwrap();
    registry.remove(GUILD);
    let new = registry
        .get_or_create(GUILD, || new_session(node.clone(), GUILD))
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&old, &new));
}
