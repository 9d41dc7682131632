//! This module aggregates various utility submodules used throughout the application.

/// Guild settings persistence in SQLite.
pub mod database;
