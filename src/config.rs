// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Client configuration.
//!
//! Holds the backend endpoint and the timing policy used by the download
//! poll loop and the transport. The defaults match the service's own
//! expectations; all of them can be overridden through the config file at
//! `~/.leonard/client.json` or the `LEONARD_URL` environment variable
//! without changing any observable contract semantics.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default backend endpoint.
const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default timeout for connection establishment (in seconds).
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default timeout for a single request, sized for long inference waits
/// (in seconds).
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default delay between download status polls (in milliseconds).
const POLL_INTERVAL_MS: u64 = 500;

/// How long a completed download stays visible before removal (in seconds).
const COMPLETED_GRACE_SECS: u64 = 3;

/// How long a cancelled or failed download stays visible (in seconds).
const CANCELLED_GRACE_SECS: u64 = 2;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the backend service.
    pub base_url: String,
    /// Connection-establishment timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-request timeout in seconds. One value for all calls, including
    /// long inference waits.
    pub request_timeout_secs: u64,
    /// Delay between download status polls in milliseconds.
    pub poll_interval_ms: u64,
    /// Grace period before removing a completed download task, in seconds.
    pub completed_grace_secs: u64,
    /// Grace period before removing a cancelled or failed task, in seconds.
    pub cancelled_grace_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            poll_interval_ms: POLL_INTERVAL_MS,
            completed_grace_secs: COMPLETED_GRACE_SECS,
            cancelled_grace_secs: CANCELLED_GRACE_SECS,
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at a custom backend URL.
    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Path of the on-disk config file.
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".leonard").join("client.json"))
            .unwrap_or_else(|| PathBuf::from(".leonard/client.json"))
    }

    /// Load the config from disk, falling back to defaults when no file
    /// exists. `LEONARD_URL` overrides the configured base URL.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;

        if let Ok(url) = std::env::var("LEONARD_URL") {
            if !url.is_empty() {
                config.base_url = url.trim_end_matches('/').to_string();
            }
        }

        Ok(config)
    }

    /// Load from a specific path, falling back to defaults when the file
    /// does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Save the config to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save to a specific path, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn completed_grace(&self) -> Duration {
        Duration::from_secs(self.completed_grace_secs)
    }

    pub fn cancelled_grace(&self) -> Duration {
        Duration::from_secs(self.cancelled_grace_secs)
    }
}
