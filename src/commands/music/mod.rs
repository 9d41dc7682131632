pub mod pause;
pub mod play;
pub mod queue;
pub mod remove;
pub mod seek;
pub mod skip;
pub mod stop;
pub mod volume;

pub mod utils;

use crate::{CommandResult, Context, Error};
use poise::{CreateReply, serenity_prelude as serenity};
use serenity::{ChannelId, GuildId, RoleId};

use utils::embedded_messages;
use utils::music_manager::{MusicError, MusicResult, PlayRequest};

/// Whether any of `roles` is named `role_name` in the guild (case-insensitive)
pub(crate) fn member_has_role(
    ctx: &serenity::Context,
    guild_id: GuildId,
    roles: &[RoleId],
    role_name: &str,
) -> bool {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return false;
    };

    roles.iter().any(|id| {
        guild
            .roles
            .get(id)
            .is_some_and(|role| role.name.eq_ignore_ascii_case(role_name))
    })
}

/// Command check: only members with the configured DJ role may use music commands
pub(crate) async fn dj_only(ctx: Context<'_>) -> Result<bool, Error> {
    let Some(role) = ctx.data().config.dj_role.as_deref() else {
        return Ok(true);
    };
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(false);
    };

    let roles = ctx
        .author_member()
        .await
        .map(|member| member.roles.clone())
        .unwrap_or_default();

    if member_has_role(ctx.serenity_context(), guild_id, &roles, role) {
        return Ok(true);
    }

    ctx.send(
        CreateReply::default()
            .content(format!("You need the `{}` role to use music commands.", role))
            .ephemeral(true),
    )
    .await?;
    Ok(false)
}

pub(crate) fn guild_id(ctx: &Context<'_>) -> MusicResult<GuildId> {
    ctx.guild_id().ok_or(MusicError::NotInGuild)
}

/// The voice channel the command author is currently in
pub(crate) fn user_voice_channel(ctx: &Context<'_>) -> Option<ChannelId> {
    let guild = ctx.guild()?;
    guild
        .voice_states
        .get(&ctx.author().id)
        .and_then(|state| state.channel_id)
}

pub(crate) fn play_request(ctx: &Context<'_>) -> MusicResult<PlayRequest> {
    Ok(PlayRequest {
        guild_id: guild_id(ctx)?,
        voice_channel: user_voice_channel(ctx),
        text_channel: Some(ctx.channel_id()),
    })
}

/// Reply with an error embed naming the failed action
pub(crate) async fn reply_error(ctx: Context<'_>, action: &str, err: &MusicError) -> CommandResult {
    ctx.send(embedded_messages::music_error(action, err)).await?;
    Ok(())
}
