//! TOML-based sync settings.
//!
//! The host application supplies the sync endpoint and a couple of knobs;
//! everything else the subsystem needs (cursor, auth token, device id) lives
//! in the database kv store.
//!
//! Settings are stored at `~/.config/lifehub/sync.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Sync subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Base URL of the sync server, e.g. `https://api.lifehub.app/`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Master switch; when false the host should not invoke the engine.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// TCP connect timeout for the connectivity probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Suggested background sync interval for the host scheduler, in minutes.
    #[serde(default = "default_interval_min")]
    pub interval_min: u32,
}

fn default_base_url() -> String {
    "http://localhost:8080/".to_string()
}
fn default_true() -> bool {
    true
}
fn default_probe_timeout_ms() -> u64 {
    1_500
}
fn default_interval_min() -> u32 {
    15
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            enabled: default_true(),
            probe_timeout_ms: default_probe_timeout_ms(),
            interval_min: default_interval_min(),
        }
    }
}

impl SyncSettings {
    /// Load settings from the default location, falling back to defaults
    /// when the file does not exist yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load settings from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save settings to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/lifehub"),
            message: e.to_string(),
        })?;
        Ok(dir.join("sync.toml"))
    }
}
