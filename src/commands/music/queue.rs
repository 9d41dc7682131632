use super::*;
use crate::commands::music::utils::embedded_messages;

async fn send_player(ctx: Context<'_>, show_queue: bool) -> CommandResult {
    let guild_id = guild_id(&ctx)?;
    let snapshot = ctx.data().music.snapshot(guild_id).await;
    let presentation = embedded_messages::render(&snapshot, show_queue);

    ctx.send(embedded_messages::player_message(&presentation))
        .await?;
    Ok(())
}

/// Show the player with the upcoming tracks
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn queue(ctx: Context<'_>) -> CommandResult {
    send_player(ctx, true).await
}

/// Show what is playing right now
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn now(ctx: Context<'_>) -> CommandResult {
    send_player(ctx, false).await
}
