use poise::serenity_prelude::{self as serenity, Context};
use serenity::{
    ComponentInteraction, CreateInteractionResponse, CreateInteractionResponseMessage, GuildId,
};
use tracing::{debug, info, warn};

use super::{
    button_controls::PlayerControl,
    embedded_messages::{self, QUEUE_FIELD},
    music_manager::{MusicManager, MusicResult},
    player_session::SessionSnapshot,
    track::PlaybackId,
};
use crate::commands::music::member_has_role;
use crate::{Data, Error};

/// Apply one button press to the guild's session and return a fresh snapshot.
///
/// `playback` is the playback the pressed message was rendered for.
pub async fn apply_control(
    music: &MusicManager,
    guild_id: GuildId,
    control: PlayerControl,
    playback: Option<PlaybackId>,
) -> MusicResult<SessionSnapshot> {
    match control {
        PlayerControl::Refresh => {}
        PlayerControl::PlayPause => {
            let state = music.toggle_pause(guild_id).await?;
            debug!("Play/pause button left guild {} {:?}", guild_id, state);
        }
        PlayerControl::Skip => {
            music.skip(guild_id, playback).await?;
        }
        PlayerControl::Stop => {
            music.stop(guild_id).await?;
        }
    }

    Ok(music.snapshot(guild_id).await)
}

fn action_name(control: PlayerControl) -> &'static str {
    match control {
        PlayerControl::Refresh => "refresh the player",
        PlayerControl::PlayPause => "pause or resume",
        PlayerControl::Skip => "skip",
        PlayerControl::Stop => "stop",
    }
}

/// Whether the message the button sits on currently lists the queue
fn shows_queue(interaction: &ComponentInteraction) -> bool {
    interaction
        .message
        .embeds
        .first()
        .is_some_and(|embed| embed.fields.iter().any(|field| field.name == QUEUE_FIELD))
}

/// Handle a button interaction
pub async fn handle_button_interaction(
    ctx: &Context,
    interaction: &ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let guild_id = interaction.guild_id.ok_or("Not in a guild")?;

    let Some((control, playback)) = PlayerControl::parse(&interaction.data.custom_id) else {
        warn!("Unknown button ID: {}", interaction.data.custom_id);
        return error_response(ctx, interaction, "Unknown button action.").await;
    };

    if let Some(role) = &data.config.dj_role {
        let roles = interaction
            .member
            .as_ref()
            .map(|member| member.roles.clone())
            .unwrap_or_default();
        if !member_has_role(ctx, guild_id, &roles, role) {
            return error_response(ctx, interaction, &format!("You need the `{}` role to use the player.", role)).await;
        }
    }

    info!("{:?} pressed by {} in guild {}", control, interaction.user.name, guild_id);

    match apply_control(&data.music, guild_id, control, playback).await {
        Ok(snapshot) => {
            let presentation = embedded_messages::render(&snapshot, shows_queue(interaction));
            interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .embed(embedded_messages::player_embed(&presentation))
                            .components(embedded_messages::player_components(&presentation)),
                    ),
                )
                .await?;
        }
        Err(err) => {
            warn!("Button {:?} failed in guild {}: {}", control, guild_id, err);
            interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embedded_messages::error_embed(action_name(control), &err))
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

/// Send an ephemeral error message for a failed interaction
async fn error_response(
    ctx: &Context,
    interaction: &ComponentInteraction,
    content: &str,
) -> Result<(), Error> {
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
