//! XDG Base Directory support.

use std::path::PathBuf;

/// XDG directory paths for Sidekick.
pub struct XdgDirs {
    /// Config directory (~/.config/sidekick or XDG_CONFIG_HOME/sidekick)
    pub config: PathBuf,
    /// Data directory (~/.local/share/sidekick or XDG_DATA_HOME/sidekick)
    pub data: PathBuf,
    /// Cache directory (~/.cache/sidekick or XDG_CACHE_HOME/sidekick)
    pub cache: PathBuf,
}

impl XdgDirs {
    /// Get XDG directories, respecting environment variables.
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            config: std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join(".config"))
                .join("sidekick"),
            data: std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join(".local/share"))
                .join("sidekick"),
            cache: std::env::var("XDG_CACHE_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join(".cache"))
                .join("sidekick"),
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.config, &self.data, &self.cache] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl Default for XdgDirs {
    fn default() -> Self {
        Self::new()
    }
}
