use poise::serenity_prelude::{self as serenity, FullEvent, Interaction};
use serenity::{ChannelId, ComponentInteraction, GuildId, UserId, VoiceState};
use tracing::{error, info, warn};

use crate::commands::music::utils::button_handlers;
use crate::{Data, Error};

/// Gateway events the command framework does not handle itself
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!("{} is connected", data_about_bot.user.name);
        }
        FullEvent::InteractionCreate {
            interaction: Interaction::Component(component),
        } if component.data.custom_id.starts_with("music_") => {
            music_component_interaction(ctx, component, data).await;
        }
        FullEvent::VoiceStateUpdate { new, .. } => {
            voice_state_update(ctx, new, data).await;
        }
        _ => (),
    }

    Ok(())
}

/// Handle component interactions for components with identities starting with "music_"
async fn music_component_interaction(ctx: &serenity::Context, component: &ComponentInteraction, data: &Data) {
    if let Err(e) = button_handlers::handle_button_interaction(ctx, component, data).await {
        error!("Error handling component interaction: {}", e);
    }
}

/// Whether the bot should leave its voice channel after a voice state change.
///
/// `listeners` is the number of non-bot members still in the bot's channel.
pub fn should_leave(bot_id: UserId, changed_user: UserId, changed_channel: Option<ChannelId>, listeners: usize) -> bool {
    if changed_user == bot_id {
        changed_channel.is_none()
    } else {
        listeners == 0
    }
}

fn count_listeners(ctx: &serenity::Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .filter(|state| {
            let is_bot = state
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .or_else(|| guild.members.get(&state.user_id).map(|member| member.user.bot))
                .unwrap_or(false);
            !is_bot
        })
        .count()
}

async fn voice_state_update(ctx: &serenity::Context, new: &VoiceState, data: &Data) {
    let Some(guild_id) = new.guild_id else {
        return;
    };
    let Some(bot_channel) = data.music.voice_channel(guild_id).await else {
        return;
    };

    let bot_id = ctx.cache.current_user().id;
    let listeners = count_listeners(ctx, guild_id, bot_channel);

    if !should_leave(bot_id, new.user_id, new.channel_id, listeners) {
        return;
    }

    info!("Leaving voice channel {} in guild {}", bot_channel, guild_id);
    if let Err(e) = data.music.teardown(guild_id).await {
        warn!("Failed to leave voice channel in guild {}: {}", guild_id, e);
    }
}
