//! Guild settings persistence backed by SQLite.
//! Settings are plain key/value strings scoped to a guild (e.g. the player volume).

use rusqlite::{Connection, OptionalExtension, params};
use serenity::model::id::GuildId;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// The default filename for the SQLite database.
pub const APPDATA_DB: &str = "application_data.db";

/// Errors raised by the settings store
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection lock was poisoned")]
    Poisoned,
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Key/value settings scoped to a guild.
pub trait SettingsStore: Send + Sync {
    /// Returns `None` when the guild never set `key`.
    fn get_setting(&self, guild_id: GuildId, key: &str) -> SettingsResult<Option<String>>;

    /// Inserts or replaces the value of `key` for the guild.
    fn set_setting(&self, guild_id: GuildId, key: &str, value: &str) -> SettingsResult<()>;
}

/// [`SettingsStore`] over a single SQLite connection.
pub struct SqliteSettings {
    conn: Mutex<Connection>,
}

impl SqliteSettings {
    /// Opens (or creates) the database file and makes sure the tables exist.
    pub fn open(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens a throwaway database, used by tests.
    pub fn open_in_memory() -> SettingsResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SettingsResult<Self> {
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Creates the `guild_settings` table if it doesn't exist.
fn create_tables(conn: &Connection) -> SettingsResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS guild_settings (
            guild_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (guild_id, key)
        )",
        [],
    )?;
    Ok(())
}

impl SettingsStore for SqliteSettings {
    fn get_setting(&self, guild_id: GuildId, key: &str) -> SettingsResult<Option<String>> {
        let conn = self.conn.lock().map_err(|_| SettingsError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM guild_settings WHERE guild_id = ?1 AND key = ?2",
                params![guild_id.get(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, guild_id: GuildId, key: &str, value: &str) -> SettingsResult<()> {
        let conn = self.conn.lock().map_err(|_| SettingsError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO guild_settings (guild_id, key, value) VALUES (?1, ?2, ?3)",
            params![guild_id.get(), key, value],
        )?;
        debug!("Saved setting {}={} for guild {}", key, value, guild_id);
        Ok(())
    }
}
