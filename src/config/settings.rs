//! Settings management via SQLite.

use crate::db::Database;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Setting not found: {0}")]
    NotFound(String),
}

/// Settings manager backed by SQLite.
pub struct Settings<'a> {
    db: &'a Database,
}

impl<'a> Settings<'a> {
    /// Create a new settings manager.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get a setting value.
    pub fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let conn = self.db.conn();
        let result: Result<String, _> =
            conn.query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
                row.get(0)
            });

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SettingsError::Database(e)),
        }
    }

    /// Get a setting value or return a default.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .ok()
            .flatten()
            .unwrap_or_else(|| default.to_string())
    }

    /// Get a boolean setting, `default` when unset.
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key).ok().flatten() {
            Some(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
            None => default,
        }
    }

    /// Set a setting value.
    pub fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.db.conn().execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, unixepoch())
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value],
        )?;
        Ok(())
    }

    /// Delete a setting.
    pub fn delete(&self, key: &str) -> Result<(), SettingsError> {
        self.db
            .conn()
            .execute("DELETE FROM settings WHERE key = ?", [key])?;
        Ok(())
    }

    // Convenience accessors for common settings

    /// How many history turns ride along with each query.
    pub fn history_limit(&self) -> usize {
        self.get_or("chat_history_limit", "20").parse().unwrap_or(20)
    }

    /// Sampling temperature handed to model factories.
    pub fn temperature(&self) -> f32 {
        self.get_or("temperature", "0.7").parse().unwrap_or(0.7)
    }

    /// User-defined instructions appended to the system prompt.
    pub fn custom_instructions(&self) -> Option<String> {
        self.get("custom_instructions")
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty())
    }

    /// Default model id when the caller does not request one.
    pub fn default_model(&self) -> Option<String> {
        self.get("default_model").ok().flatten()
    }

    /// Whether repeated queries may be served from the response cache.
    pub fn use_cache(&self) -> bool {
        self.get_bool_or("use_cache", true)
    }

    /// Tool confirmation timeout.
    pub fn confirm_timeout(&self) -> Duration {
        let secs = self
            .get_or("tool_confirm_timeout_secs", "120")
            .parse()
            .unwrap_or(120);
        Duration::from_secs(secs)
    }
}

/// Immutable snapshot of the settings the pipeline reads per query.
///
/// The orchestrator works from a snapshot so settings edits mid-pipeline
/// cannot tear a single query's view of the configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub history_limit: usize,
    pub temperature: f32,
    pub custom_instructions: Option<String>,
    pub default_model: Option<String>,
    pub use_cache: bool,
    pub confirm_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            temperature: 0.7,
            custom_instructions: None,
            default_model: None,
            use_cache: true,
            confirm_timeout: Duration::from_secs(120),
        }
    }
}

impl OrchestratorConfig {
    /// Snapshot the current settings.
    pub fn from_settings(settings: &Settings<'_>) -> Self {
        Self {
            history_limit: settings.history_limit(),
            temperature: settings.temperature(),
            custom_instructions: settings.custom_instructions(),
            default_model: settings.default_model(),
            use_cache: settings.use_cache(),
            confirm_timeout: settings.confirm_timeout(),
        }
    }
}
