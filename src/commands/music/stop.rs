use super::*;
use crate::commands::music::utils::embedded_messages;

/// Stop the music, clear the queue and leave the voice channel
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn stop(ctx: Context<'_>) -> CommandResult {
    let guild_id = guild_id(&ctx)?;

    match ctx.data().music.stop(guild_id).await {
        Ok(()) => {
            ctx.send(CreateReply::default().embed(embedded_messages::stopped()))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, "stop", &err).await,
    }
}
