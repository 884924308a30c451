//! SQLite database for chat transcripts, the response cache, and settings.

mod cache;
mod migrations;
mod transcripts;

pub use cache::{ResponseCache, DEFAULT_CACHE_MAX_AGE_SECS};
pub use transcripts::{
    MemoryTranscripts, SqliteTranscripts, TranscriptError, TranscriptStore,
};

use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Database connection wrapper.
///
/// The connection sits behind a mutex so the stores built on top can be
/// shared across async tasks; access is short and per-statement.
pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    /// Open the database at the default location.
    pub fn open() -> anyhow::Result<Self> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open the database at a specific path.
    pub fn open_at(path: PathBuf) -> anyhow::Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;

        // Restrictive file permissions: transcripts are private user data.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!("Failed to set database file permissions: {}", e);
            }
        }

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (tests and ephemeral embedding).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Get the default database path.
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let dirs = crate::config::XdgDirs::new();
        Ok(dirs.data.join("sidekick.db"))
    }

    /// Run database migrations.
    pub fn migrate(&self) -> anyhow::Result<()> {
        migrations::run_migrations(&self.conn())?;
        Ok(())
    }

    /// Lock the connection for a statement or two.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get the database path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        // Re-running migrations is a no-op.
        db.migrate().unwrap();
    }

    #[test]
    fn test_open_at_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sidekick.db");
        let db = Database::open_at(path.clone()).unwrap();
        db.migrate().unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), &path);
    }
}
