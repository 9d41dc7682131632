use serenity::all::{ButtonStyle, CreateActionRow, CreateButton, ReactionType};

use super::player_session::PlayerState;
use super::track::PlaybackId;

/// Transport controls shown under the player message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerControl {
    Refresh,
    PlayPause,
    Skip,
    Stop,
}

impl PlayerControl {
    pub fn custom_id(self) -> &'static str {
        match self {
            PlayerControl::Refresh => "music_refresh",
            PlayerControl::PlayPause => "music_play_pause",
            PlayerControl::Skip => "music_skip",
            PlayerControl::Stop => "music_stop",
        }
    }

    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            "music_refresh" => Some(PlayerControl::Refresh),
            "music_play_pause" => Some(PlayerControl::PlayPause),
            "music_skip" => Some(PlayerControl::Skip),
            "music_stop" => Some(PlayerControl::Stop),
            _ => None,
        }
    }

    /// Parse a pressed button's id, along with the playback it was rendered for
    pub fn parse(custom_id: &str) -> Option<(Self, Option<PlaybackId>)> {
        match custom_id.split_once(':') {
            Some((base, playback)) => {
                let playback = playback.parse().ok().map(PlaybackId)?;
                Some((Self::from_custom_id(base)?, Some(playback)))
            }
            None => Some((Self::from_custom_id(custom_id)?, None)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

impl From<ControlStyle> for ButtonStyle {
    fn from(style: ControlStyle) -> Self {
        match style {
            ControlStyle::Primary => ButtonStyle::Primary,
            ControlStyle::Secondary => ButtonStyle::Secondary,
            ControlStyle::Success => ButtonStyle::Success,
            ControlStyle::Danger => ButtonStyle::Danger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlButton {
    pub control: PlayerControl,
    pub label: &'static str,
    pub emoji: &'static str,
    pub style: ControlStyle,
    pub disabled: bool,
    /// Playback the button acts on, set for the skip button while a track is loaded
    pub playback: Option<PlaybackId>,
}

impl ControlButton {
    pub fn custom_id(&self) -> String {
        match self.playback {
            Some(playback) => format!("{}:{}", self.control.custom_id(), playback.0),
            None => self.control.custom_id().to_string(),
        }
    }
}

/// Buttons for a player in `state`. The play/pause button shows what pressing it will do,
/// and the skip button is tied to `playback`.
pub fn control_buttons(state: PlayerState, playback: Option<PlaybackId>) -> Vec<ControlButton> {
    let has_track = matches!(state, PlayerState::Playing | PlayerState::Paused);
    let connected = has_track || state == PlayerState::ConnectedEmpty;

    let play_pause = if state == PlayerState::Paused {
        ControlButton {
            control: PlayerControl::PlayPause,
            label: "Resume",
            emoji: "▶️",
            style: ControlStyle::Success,
            disabled: false,
            playback: None,
        }
    } else {
        ControlButton {
            control: PlayerControl::PlayPause,
            label: "Pause",
            emoji: "⏸️",
            style: ControlStyle::Primary,
            disabled: !has_track,
            playback: None,
        }
    };

    vec![
        ControlButton {
            control: PlayerControl::Refresh,
            label: "Refresh",
            emoji: "🔄",
            style: ControlStyle::Secondary,
            disabled: false,
            playback: None,
        },
        play_pause,
        ControlButton {
            control: PlayerControl::Skip,
            label: "Skip",
            emoji: "⏭️",
            style: ControlStyle::Secondary,
            disabled: !has_track,
            playback: playback.filter(|_| has_track),
        },
        ControlButton {
            control: PlayerControl::Stop,
            label: "Stop",
            emoji: "⏹️",
            style: ControlStyle::Danger,
            disabled: !connected,
            playback: None,
        },
    ]
}

/// Creates a row of music control buttons
pub fn action_rows(buttons: &[ControlButton]) -> Vec<CreateActionRow> {
    let buttons = buttons
        .iter()
        .map(|button| {
            CreateButton::new(button.custom_id())
                .emoji(ReactionType::Unicode(button.emoji.to_string()))
                .style(button.style.into())
                .label(button.label)
                .disabled(button.disabled)
        })
        .collect();

    vec![CreateActionRow::Buttons(buttons)]
}
