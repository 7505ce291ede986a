//! Settings storage
//!
//! Manages persistence of the manager's own settings (backend address, push
//! timeout, file locations).

use crate::storage::{get_data_dir, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Host the inference backend listens on
    #[serde(default = "default_backend_host")]
    pub backend_host: String,
    /// Timeout for the live parameter push, in seconds (1 - 120)
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,
    /// Override for the configs file (defaults to the data directory)
    #[serde(default)]
    pub configs_path: Option<PathBuf>,
    /// JSON list of known model sources
    #[serde(default)]
    pub model_catalog_path: Option<PathBuf>,
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}

fn default_push_timeout() -> u64 {
    10
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            backend_host: default_backend_host(),
            push_timeout_secs: default_push_timeout(),
            configs_path: None,
            model_catalog_path: None,
        }
    }
}

impl ManagerSettings {
    /// Clamp values into acceptable ranges
    pub fn validate(&mut self) {
        if self.backend_host.trim().is_empty() {
            self.backend_host = default_backend_host();
        }
        self.push_timeout_secs = self.push_timeout_secs.clamp(1, 120);
    }
}

fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> ManagerSettings {
    match get_settings_path().and_then(|path| load_settings_from(&path)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            ManagerSettings::default()
        }
    }
}

fn load_settings_from(path: &Path) -> Result<ManagerSettings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(ManagerSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: ManagerSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from disk");
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &ManagerSettings) -> Result<(), StorageError> {
    save_settings_to(settings, &get_settings_path()?)
}

fn save_settings_to(settings: &ManagerSettings, path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to disk");
    Ok(())
}
