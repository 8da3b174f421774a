//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: backend
//! base URL, request timeout, task poll interval, where credentials are kept,
//! and the last used username.
//!
//! Configuration is stored at `~/.config/paperdesk/config.json`. Any field can
//! be overridden with a `PAPERDESK_*` environment variable.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "paperdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// The backend mounts its API under `/api/v1`.
const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Delay between task status queries in seconds.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// JSON file in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Process memory only
    Memory,
}

impl std::str::FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(CredentialBackend::File),
            "keyring" | "keychain" => Ok(CredentialBackend::Keyring),
            "memory" => Ok(CredentialBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown credential backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub credential_backend: CredentialBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            credential_backend: CredentialBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.reject_zero_durations();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// A zero timeout fails every request and a zero poll interval spins the
    /// poll loop; fall back to the defaults for either.
    fn reject_zero_durations(&mut self) {
        if self.request_timeout_secs == 0 {
            warn!("Ignoring request_timeout_secs = 0, using default");
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        if self.poll_interval_secs == 0 {
            warn!("Ignoring poll_interval_secs = 0, using default");
            self.poll_interval_secs = DEFAULT_POLL_INTERVAL_SECS;
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(url) = var("PAPERDESK_BASE_URL") {
            self.base_url = url;
        }
        if let Some(value) = var("PAPERDESK_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %value, "Ignoring invalid PAPERDESK_TIMEOUT_SECS"),
            }
        }
        if let Some(value) = var("PAPERDESK_POLL_INTERVAL_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => self.poll_interval_secs = secs,
                _ => warn!(value = %value, "Ignoring invalid PAPERDESK_POLL_INTERVAL_SECS"),
            }
        }
        if let Some(value) = var("PAPERDESK_CREDENTIAL_BACKEND") {
            match value.parse() {
                Ok(backend) => self.credential_backend = backend,
                Err(e) => warn!(error = %e, "Ignoring PAPERDESK_CREDENTIAL_BACKEND"),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}
