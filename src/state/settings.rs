// SPDX-License-Identifier: MPL-2.0

use crate::config::{APP_ID, DEFAULT_REQUEST_TIMEOUT, DEFAULT_STARTUP_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_URL: &str = "FAXTHAT_SUPABASE_URL";
const ENV_ANON_KEY: &str = "FAXTHAT_SUPABASE_ANON_KEY";
const ENV_REQUEST_TIMEOUT: &str = "FAXTHAT_REQUEST_TIMEOUT_SECS";

/// Project endpoint and public API key of the hosted backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
}

impl BackendSettings {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }
}

/// Persistent application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    /// When true, disable animations/transitions regardless of system setting
    #[serde(default)]
    pub reduce_motion: bool,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_startup_timeout_secs() -> u64 {
    DEFAULT_STARTUP_TIMEOUT.as_secs()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            request_timeout_secs: default_request_timeout_secs(),
            startup_timeout_secs: default_startup_timeout_secs(),
            reduce_motion: false,
        }
    }
}

impl AppSettings {
    /// Get the settings file path (~/.config/io.github.faxthat.FaxThat/settings.json)
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push("settings.json");
            p
        })
    }

    /// Load settings from disk, then apply environment overrides
    pub fn load() -> Self {
        let mut settings = match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// Read a settings file, or return defaults if it is missing or corrupt
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Environment values win over the file; blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_URL) {
            self.backend.url = url;
        }
        if let Some(key) = lookup(ENV_ANON_KEY) {
            self.backend.anon_key = key;
        }
        if let Some(secs) = lookup(ENV_REQUEST_TIMEOUT).and_then(|v| v.trim().parse().ok()) {
            self.request_timeout_secs = secs;
        }
    }

    /// Never zero: a zero timeout would fail every call immediately.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs.max(1))
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), String> {
        let path = Self::settings_path().ok_or("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {e}"))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {e}"))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {e}"))?;

        Ok(())
    }
}
