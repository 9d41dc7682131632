use super::*;
use crate::commands::music::utils::embedded_messages;

/// Skip the currently playing song
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn skip(ctx: Context<'_>) -> CommandResult {
    let guild_id = guild_id(&ctx)?;

    match ctx.data().music.skip(guild_id, None).await {
        Ok(skipped) => {
            ctx.send(CreateReply::default().embed(embedded_messages::skipped(&skipped)))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, "skip", &err).await,
    }
}
