//! Configuration and settings management.

mod settings;
mod xdg;

pub use settings::{OrchestratorConfig, Settings, SettingsError};
pub use xdg::XdgDirs;
