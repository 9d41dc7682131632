//! Shared types for the pibot Discord bot: the framework data handed to every
//! command, and the error/result aliases used by command handlers.

use std::sync::Arc;

pub mod commands;
pub mod config;
pub mod events;
pub mod utils;

use commands::music::utils::music_manager::MusicManager;
use config::Config;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type CommandResult = Result<(), Error>;

/// User data, which is stored and accessible in all command invocations.
///
/// This is the only place long-lived state lives: the music manager owns the
/// session registry and the handles to the audio node and the settings store.
pub struct Data {
    pub music: Arc<MusicManager>,
    pub config: Arc<Config>,
}
