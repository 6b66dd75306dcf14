//! Client settings
//!
//! Stored as JSON next to the user data. A missing or broken file falls
//! back to defaults so the client always starts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ApiError;

/// Overrides `api_base_url` when set.
pub const API_URL_ENV: &str = "MUSICAI_API_URL";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Keys accepted by [`Settings::set`].
pub const SETTING_KEYS: [&str; 5] = [
    "api_base_url",
    "request_timeout_secs",
    "poll_interval_ms",
    "max_upload_bytes",
    "stats_interval_ms",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    /// Shared timeout for every backend call; separation requests are slow.
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_upload_bytes: u64,
    pub stats_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 300,
            poll_interval_ms: 2000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            stats_interval_ms: 5000,
        }
    }
}

impl Settings {
    /// Load settings from `path`, using defaults for anything missing.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Settings>(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Failed to parse settings, using defaults: {}", e);
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ApiError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ApiError::Settings(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| ApiError::Settings(format!("Failed to save settings: {}", e)))
    }

    /// Set one field by its JSON name, as `config set` does.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ApiError> {
        let value = value.trim();
        match key {
            "api_base_url" => {
                let url = reqwest::Url::parse(value)
                    .map_err(|e| ApiError::Settings(format!("Invalid URL {:?}: {}", value, e)))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ApiError::Settings(format!(
                        "API URL must be http or https, got {}",
                        url.scheme()
                    )));
                }
                self.api_base_url = value.trim_end_matches('/').to_string();
            }
            "request_timeout_secs" => self.request_timeout_secs = parse_positive(key, value)?,
            "poll_interval_ms" => self.poll_interval_ms = parse_positive(key, value)?,
            "max_upload_bytes" => self.max_upload_bytes = parse_positive(key, value)?,
            "stats_interval_ms" => self.stats_interval_ms = parse_positive(key, value)?,
            _ => {
                return Err(ApiError::Settings(format!(
                    "Unknown setting {:?}, expected one of: {}",
                    key,
                    SETTING_KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }

    /// Apply the environment override for the base URL.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ApiError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ApiError::Settings(format!(
            "{} must be a positive integer, got {:?}",
            key, value
        ))),
    }
}
