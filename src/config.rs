//! Runtime configuration, read from the environment (and a `.env` file if present).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::commands::music::utils::music_manager::PlayerOptions;
use crate::utils::database::APPDATA_DB;

/// Errors raised while reading the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection details for the Lavalink audio node
#[derive(Debug, Clone)]
pub struct LavalinkConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,
    pub reconnect_attempts: u8,
}

impl LavalinkConfig {
    pub fn rest_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/v4/websocket", scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub lavalink: LavalinkConfig,
    pub database_path: PathBuf,
    /// Upper bound on every request the player makes to the audio node
    pub node_timeout: Duration,
    /// Volume used for guilds that never set one
    pub default_volume: u8,
    /// Disconnect once the last queued track has finished
    pub leave_when_finished: bool,
    /// Role required to use music commands; everyone may use them when unset
    pub dj_role: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let lavalink = LavalinkConfig {
            host: lookup("LAVALINK_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(&lookup, "LAVALINK_PORT", 2333)?,
            password: lookup("LAVALINK_PASS").unwrap_or_else(|| "youshallnotpass".to_string()),
            secure: parse_or(&lookup, "LAVALINK_SECURE", false)?,
            reconnect_attempts: parse_or(&lookup, "LAVALINK_RECONNECT_ATTEMPTS", 5)?,
        };

        let default_volume: u8 = parse_or(&lookup, "DEFAULT_VOLUME", 25)?;
        if default_volume > 100 {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_VOLUME",
                value: default_volume.to_string(),
                reason: "volume must be between 0 and 100".to_string(),
            });
        }

        let node_timeout_secs: u64 = parse_or(&lookup, "NODE_TIMEOUT_SECS", 5)?;
        if node_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "NODE_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }

        Ok(Self {
            discord_token,
            lavalink,
            database_path: lookup("DATABASE_PATH")
                .unwrap_or_else(|| APPDATA_DB.to_string())
                .into(),
            node_timeout: Duration::from_secs(node_timeout_secs),
            default_volume,
            leave_when_finished: parse_or(&lookup, "LEAVE_WHEN_FINISHED", true)?,
            dj_role: lookup("DJ_ROLE").filter(|role| !role.trim().is_empty()),
        })
    }

    pub fn player_options(&self) -> PlayerOptions {
        PlayerOptions {
            node_timeout: self.node_timeout,
            default_volume: self.default_volume,
            leave_when_finished: self.leave_when_finished,
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::Invalid {
                    key,
                    value: value.clone(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}
