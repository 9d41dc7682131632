use super::*;
use crate::commands::music::utils::embedded_messages;

/// Set the player volume for this server
#[poise::command(slash_command, guild_only, category = "Music", check = "dj_only")]
pub async fn volume(
    ctx: Context<'_>,
    #[description = "Volume between 0 and 100"] volume: i64,
) -> CommandResult {
    let guild_id = guild_id(&ctx)?;

    match ctx.data().music.set_volume(guild_id, volume).await {
        Ok(applied) => {
            ctx.send(CreateReply::default().embed(embedded_messages::volume_set(applied)))
                .await?;
            Ok(())
        }
        Err(err) => reply_error(ctx, "change the volume", &err).await,
    }
}
