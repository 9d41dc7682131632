use poise::CreateReply;
use serenity::all::{CreateActionRow, CreateEmbed};
use std::time::Duration;

use super::button_controls::{self, ControlButton};
use super::format_duration;
use super::music_manager::{MusicError, PlaylistQueued};
use super::player_session::{PlayerState, SessionSnapshot, Skipped};
use super::track::Track;

/// Number of cells in the now-playing progress bar
pub const PROGRESS_BAR_WIDTH: usize = 20;

/// Embed field title used for the queue listing
pub const QUEUE_FIELD: &str = "📋 Up next";

const SUCCESS_COLOR: u32 = 0x00ff00;
const ERROR_COLOR: u32 = 0xff0000;
const IDLE_COLOR: u32 = 0x808080;

/// One entry of the queue listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLine {
    /// 1-based position in the queue
    pub index: usize,
    pub title: String,
    pub uri: String,
    pub duration: Duration,
}

/// Everything the player message shows, independent of Discord types
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    pub state: PlayerState,
    pub title: String,
    pub description: String,
    /// Fraction of the current track already played, in `[0, 1]`
    pub progress: f64,
    pub progress_bar: String,
    pub volume: u8,
    /// Queue listing; `None` when the queue is not shown
    pub queue: Option<Vec<QueueLine>>,
    pub queue_total: Duration,
    pub controls: Vec<ControlButton>,
}

pub fn progress_ratio(position: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        0.0
    } else {
        (position.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
    }
}

/// Create a progress bar for the current track
pub fn format_progress_bar(position: Duration, total: Duration) -> String {
    let marker = (progress_ratio(position, total) * (PROGRESS_BAR_WIDTH - 1) as f64).round() as usize;
    let remaining = PROGRESS_BAR_WIDTH - 1 - marker;

    format!("{}🔘{}", "▬".repeat(marker), "▬".repeat(remaining))
}

/// Build the player presentation from a session snapshot
pub fn render(snapshot: &SessionSnapshot, show_queue: bool) -> Presentation {
    let queue = show_queue.then(|| {
        snapshot
            .queue
            .iter()
            .enumerate()
            .map(|(index, track)| QueueLine {
                index: index + 1,
                title: track.title().to_string(),
                uri: track.uri().to_string(),
                duration: track.duration(),
            })
            .collect()
    });

    let (title, description, progress, progress_bar) = match &snapshot.current {
        Some(track) => {
            let title = if snapshot.state == PlayerState::Paused {
                "⏸️ Paused"
            } else {
                "🎵 Now Playing"
            };
            let bar = format_progress_bar(snapshot.position, track.duration());
            let description = format!(
                "**{}**\n{} `{}/{}`",
                track.markdown_link(),
                bar,
                format_duration(snapshot.position),
                format_duration(track.duration())
            );
            (
                title.to_string(),
                description,
                progress_ratio(snapshot.position, track.duration()),
                bar,
            )
        }
        None => (
            "🔇 Nothing playing".to_string(),
            "Use `/play` to start the music".to_string(),
            0.0,
            format_progress_bar(Duration::ZERO, Duration::ZERO),
        ),
    };

    Presentation {
        state: snapshot.state,
        title,
        description,
        progress,
        progress_bar,
        volume: snapshot.volume,
        queue,
        queue_total: snapshot.queue.total_duration(),
        controls: button_controls::control_buttons(snapshot.state, snapshot.playback),
    }
}

fn queue_listing(lines: &[QueueLine], total: Duration) -> String {
    if lines.is_empty() {
        return "📭 Queue is empty".to_string();
    }

    let mut listing = String::new();
    for line in lines.iter().take(10) {
        listing.push_str(&format!(
            "`{}.` [{}]({}) `{}`\n",
            line.index,
            line.title,
            line.uri,
            format_duration(line.duration)
        ));
    }
    if lines.len() > 10 {
        listing.push_str(&format!("…and {} more\n", lines.len() - 10));
    }
    listing.push_str(&format!("\n**⏱️ Total Duration:** `{}`", format_duration(total)));
    listing
}

/// Create the embed for the player message
pub fn player_embed(presentation: &Presentation) -> CreateEmbed {
    let color = match presentation.state {
        PlayerState::Playing | PlayerState::Paused => SUCCESS_COLOR,
        _ => IDLE_COLOR,
    };

    let mut embed = CreateEmbed::new()
        .title(&presentation.title)
        .description(&presentation.description)
        .color(color);

    if presentation.state != PlayerState::Idle {
        embed = embed.field("Volume", format!("`{}%`", presentation.volume), true);
    }

    if let Some(lines) = &presentation.queue {
        embed = embed.field(QUEUE_FIELD, queue_listing(lines, presentation.queue_total), false);
    }

    embed
}

pub fn player_components(presentation: &Presentation) -> Vec<CreateActionRow> {
    button_controls::action_rows(&presentation.controls)
}

/// Player message with embed and transport controls
pub fn player_message(presentation: &Presentation) -> CreateReply {
    CreateReply::default()
        .embed(player_embed(presentation))
        .components(player_components(presentation))
}

/// Create an embed for when a song is now playing
pub fn now_playing(track: &Track) -> CreateEmbed {
    CreateEmbed::new()
        .title("🎵 Now Playing")
        .description(track.markdown_link())
        .field("Duration", format!("`{}`", format_duration(track.duration())), true)
        .color(SUCCESS_COLOR)
}

/// Create an embed for when a song is added to the queue
pub fn added_to_queue(track: &Track, position: usize) -> CreateEmbed {
    CreateEmbed::new()
        .title("🎵 Added to Queue")
        .description(track.markdown_link())
        .field("Duration", format!("`{}`", format_duration(track.duration())), true)
        .field("Position", format!("`#{}`", position), true)
        .color(SUCCESS_COLOR)
}

pub fn playlist_queued(queued: &PlaylistQueued) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title("📋 Playlist Queued")
        .description(format!("Added **{}** tracks from **{}**", queued.count, queued.name))
        .color(SUCCESS_COLOR);

    if let Some(track) = &queued.started {
        embed = embed.field("Now Playing", track.markdown_link(), false);
    }
    if let Some(reason) = &queued.start_failed {
        embed = embed.field("Could not start playback", reason, false);
    }
    embed
}

/// Create an embed for when a track is skipped
pub fn skipped(skipped: &Skipped) -> CreateEmbed {
    let next = match &skipped.next {
        Some(track) => format!("Now playing {}", track.markdown_link()),
        None => "The queue is empty".to_string(),
    };

    CreateEmbed::new()
        .title("⏭️ Skipped")
        .description(format!("Skipped {}\n{}", skipped.skipped.markdown_link(), next))
        .color(SUCCESS_COLOR)
}

/// Create an embed for when a track is paused
pub fn paused(track: &Track) -> CreateEmbed {
    CreateEmbed::new()
        .title("⏸️ Paused")
        .description(format!("Paused {}", track.markdown_link()))
        .color(SUCCESS_COLOR)
}

/// Create an embed for when a track is resumed
pub fn resumed(track: &Track) -> CreateEmbed {
    CreateEmbed::new()
        .title("▶️ Resumed")
        .description(format!("Resumed {}", track.markdown_link()))
        .color(SUCCESS_COLOR)
}

pub fn seeked(position: Duration) -> CreateEmbed {
    CreateEmbed::new()
        .title("⏩ Seeked")
        .description(format!("Jumped to `{}`", format_duration(position)))
        .color(SUCCESS_COLOR)
}

pub fn volume_set(volume: u8) -> CreateEmbed {
    CreateEmbed::new()
        .title("🔊 Volume")
        .description(format!("Volume set to `{}%`", volume))
        .color(SUCCESS_COLOR)
}

/// Create an embed for when a track is removed from the queue
pub fn track_removed(track: &Track, position: usize) -> CreateEmbed {
    CreateEmbed::new()
        .title("🗑️ Track Removed")
        .description(format!("Removed {} from position #{}", track.markdown_link(), position))
        .color(SUCCESS_COLOR)
}

/// Create an embed for when the bot stops playing music
pub fn stopped() -> CreateEmbed {
    CreateEmbed::new()
        .title("⏹️ Stopped")
        .description("Playback stopped, queue cleared and voice channel left")
        .color(SUCCESS_COLOR)
}

pub fn queue_finished() -> CreateEmbed {
    CreateEmbed::new()
        .title("✅ Queue Finished")
        .description("No more tracks to play")
        .color(IDLE_COLOR)
}

pub fn voice_closed(reason: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("👋 Disconnected")
        .description(format!("Lost the voice connection: {}", reason))
        .color(IDLE_COLOR)
}

/// Error embed naming what was attempted and why it failed
pub fn error_embed(action: &str, err: &MusicError) -> CreateEmbed {
    CreateEmbed::new()
        .title("❌ Error")
        .description(format!("Failed to {}: {}", action, err))
        .color(ERROR_COLOR)
}

/// Create an ephemeral error reply for a failed music command
pub fn music_error(action: &str, err: &MusicError) -> CreateReply {
    CreateReply::default()
        .embed(error_embed(action, err))
        .ephemeral(true)
}
