use super::*;
use crate::commands::music::utils::embedded_messages;
use std::time::Duration;

/// Jump to a position in the current track
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn seek(
    ctx: Context<'_>,
    #[description = "Position in seconds"]
    #[min = 0]
    seconds: u64,
) -> CommandResult {
    let guild_id = guild_id(&ctx)?;

    match ctx
        .data()
        .music
        .seek(guild_id, Duration::from_secs(seconds))
        .await
    {
        Ok(position) => {
            ctx.send(CreateReply::default().embed(embedded_messages::seeked(position)))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, "seek", &err).await,
    }
}
