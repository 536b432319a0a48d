//! Settings persistence module
//!
//! Client configuration loaded from disk with environment overrides

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE: &str = "settings.json";
const APP_NAME: &str = "ShipKit";

pub const API_URL_ENV: &str = "SHIPKIT_API_URL";
pub const REQUEST_TIMEOUT_ENV: &str = "SHIPKIT_REQUEST_TIMEOUT_SECS";

/// Client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URL of the ShipKit API, without a trailing slash
    pub api_base_url: String,
    /// Deadline applied to every HTTP request
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            user_agent: format!("ShipKit-Client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Join an API path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Apply `SHIPKIT_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(REQUEST_TIMEOUT_ENV).ok(),
        )
    }

    fn with_overrides(mut self, api_url: Option<String>, timeout: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            debug!("API base URL overridden from environment");
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = timeout {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!("Ignoring invalid {} value: {:?}", REQUEST_TIMEOUT_ENV, raw),
            }
        }
        self
    }
}

/// Get the settings directory path
fn get_settings_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}

/// Per-user directory holding persisted tokens
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join(APP_NAME))
}

/// Load settings from the default location, then apply environment overrides
pub fn load_settings() -> ClientSettings {
    let settings = match get_settings_dir() {
        Some(dir) => load_settings_from(&dir.join(SETTINGS_FILE)),
        None => {
            debug!("Could not determine settings path, using defaults");
            ClientSettings::default()
        }
    };
    settings.with_env_overrides()
}

/// Load settings from a file, falling back to defaults on any failure
pub fn load_settings_from(path: &Path) -> ClientSettings {
    if !path.exists() {
        debug!("Settings file does not exist, using defaults");
        return ClientSettings::default();
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(settings) => {
                info!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                error!("Failed to parse settings file: {}", e);
                ClientSettings::default()
            }
        },
        Err(e) => {
            error!("Failed to read settings file: {}", e);
            ClientSettings::default()
        }
    }
}

/// Save settings to the default location
pub fn save_settings(settings: &ClientSettings) -> Result<(), String> {
    let dir = get_settings_dir().ok_or_else(|| "Could not determine settings directory".to_string())?;
    save_settings_to(settings, &dir.join(SETTINGS_FILE))
}

pub fn save_settings_to(settings: &ClientSettings, path: &Path) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;
    }

    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    fs::write(path, json).map_err(|e| format!("Failed to write settings file: {}", e))?;
    info!("Saved settings to {:?}", path);
    Ok(())
}
