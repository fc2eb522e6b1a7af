//! Watcher configuration, loadable from a TOML file.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, but each one is logged as a warning.
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::DEFAULT_UPDATE_INTERVAL;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Options recognized by [`crate::FeedWatcher`]. Any subset of keys may be
/// given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Poll interval in milliseconds. 0 = default (120000).
    pub update_interval_ms: u64,

    /// Maximum number of items kept per feed (0 = unlimited).
    pub item_limit: usize,

    /// Fetch each item's page for an Open Graph image when it has no image thumbnail.
    pub extra_images: bool,

    /// Remember Open Graph lookups per link for the watcher's lifetime.
    pub cache_images: bool,

    /// Feed URLs registered at construction.
    pub feeds: Vec<String>,

    /// Start the update timer after the initial cycle.
    pub auto_update: bool,

    /// Timeout for each HTTP request, in seconds.
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_INTERVAL.as_millis() as u64,
            item_limit: 0,
            extra_images: false,
            cache_images: true,
            feeds: Vec::new(),
            auto_update: true,
            request_timeout_secs: 30,
            user_agent: concat!("feedwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "update_interval_ms",
        "item_limit",
        "extra_images",
        "cache_images",
        "feeds",
        "auto_update",
        "request_timeout_secs",
        "user_agent",
    ];

    pub fn update_interval(&self) -> Duration {
        match self.update_interval_ms {
            0 => DEFAULT_UPDATE_INTERVAL,
            ms => Duration::from_millis(ms),
        }
    }

    pub fn effective_item_limit(&self) -> Option<usize> {
        (self.item_limit > 0).then_some(self.item_limit)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Reads `path` as TOML.
    ///
    /// A file that does not exist gives the defaults. Files over 1 MB are
    /// refused before being read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        if size > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "{} is {size} bytes, limit is {}",
                path.display(),
                Self::MAX_FILE_SIZE
            )));
        }

        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Parses configuration from TOML text. Blank text yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            feeds = config.feeds.len(),
            interval_ms = config.update_interval().as_millis() as u64,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
