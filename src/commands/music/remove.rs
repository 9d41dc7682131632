use super::*;
use crate::commands::music::utils::embedded_messages;

/// Remove a track from the queue by its position
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Position of the track to remove (1-based)"] position: usize,
) -> CommandResult {
    let guild_id = guild_id(&ctx)?;

    match ctx.data().music.remove(guild_id, position).await {
        Ok(track) => {
            ctx.send(CreateReply::default().embed(embedded_messages::track_removed(&track, position)))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, "remove the track", &err).await,
    }
}
