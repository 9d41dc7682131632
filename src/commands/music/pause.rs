use super::*;
use crate::commands::music::utils::embedded_messages;

/// Pause the current track
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn pause(ctx: Context<'_>) -> CommandResult {
    let guild_id = guild_id(&ctx)?;

    match ctx.data().music.pause(guild_id).await {
        Ok(track) => {
            ctx.send(CreateReply::default().embed(embedded_messages::paused(&track)))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, "pause", &err).await,
    }
}

/// Resume the paused track
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn resume(ctx: Context<'_>) -> CommandResult {
    let guild_id = guild_id(&ctx)?;

    match ctx.data().music.resume(guild_id).await {
        Ok(track) => {
            ctx.send(CreateReply::default().embed(embedded_messages::resumed(&track)))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, "resume", &err).await,
    }
}
