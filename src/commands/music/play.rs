use super::*;
use crate::commands::music::utils::{
    embedded_messages,
    music_manager::QueueMode,
    player_session::Enqueued,
};
use tracing::info;

async fn request_track(ctx: Context<'_>, query: String, mode: QueueMode) -> CommandResult {
    info!("Received {:?} request with query: {}", mode, query);

    let request = match play_request(&ctx) {
        Ok(request) => request,
        Err(err) => return reply_error(ctx, "play", &err).await,
    };

    // Defer the response since searching might take time
    ctx.defer().await?;

    let embed = match ctx.data().music.play(request, &query, mode).await {
        Ok(Enqueued::Started(track)) => embedded_messages::now_playing(&track),
        Ok(Enqueued::Queued { track, position }) => {
            embedded_messages::added_to_queue(&track, position)
        }
        Err(err) => return reply_error(ctx, &format!("play `{}`", query), &err).await,
    };

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Play a song right away, replacing the current one
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn play(
    ctx: Context<'_>,
    #[description = "URL or search query"] query: String,
) -> CommandResult {
    request_track(ctx, query, QueueMode::Now).await
}

/// Add a song to the end of the queue
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn add(
    ctx: Context<'_>,
    #[description = "URL or search query"] query: String,
) -> CommandResult {
    request_track(ctx, query, QueueMode::Last).await
}

/// Add a song so it plays next
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn playnext(
    ctx: Context<'_>,
    #[description = "URL or search query"] query: String,
) -> CommandResult {
    request_track(ctx, query, QueueMode::Next).await
}

/// Add every track of a playlist to the queue
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn playlist(
    ctx: Context<'_>,
    #[description = "Playlist URL or search query"] query: String,
) -> CommandResult {
    info!("Received playlist command with query: {}", query);

    let request = match play_request(&ctx) {
        Ok(request) => request,
        Err(err) => return reply_error(ctx, "queue the playlist", &err).await,
    };

    ctx.defer().await?;

    match ctx.data().music.enqueue_playlist(request, &query).await {
        Ok(queued) => {
            ctx.send(CreateReply::default().embed(embedded_messages::playlist_queued(&queued)))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, &format!("queue `{}`", query), &err).await,
    }
}
