//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the optional tunables file inside the data directory.
const CONFIG_FILE_NAME: &str = "bugbot.toml";

/// bugbot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path (guild config, block list, logs).
    pub data_dir: PathBuf,

    /// Discord bot token.
    pub discord_token: String,

    /// Report pipeline tunables.
    pub tracker: TrackerConfig,
}

/// Timing and scan parameters for the report pipeline.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Max distance between a report and a pending attachment for them to be paired.
    pub correlation_window_ms: u64,

    /// Wait after thread creation so near-simultaneous attachments can land.
    pub publish_grace_ms: u64,

    /// Unmatched pending attachments are evicted after this long.
    pub pending_ttl_secs: u64,

    /// How long a blocked sender's trailing attachments keep being deleted.
    pub block_marker_ttl_secs: u64,

    /// How long a published origin message is remembered.
    pub published_ttl_secs: u64,

    /// Thread messages scanned when looking for a detail record.
    pub detail_scan_limit: u8,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            correlation_window_ms: 3_000,
            publish_grace_ms: 500,
            pending_ttl_secs: 600,
            block_marker_ttl_secs: 60,
            published_ttl_secs: 3_600,
            detail_scan_limit: 50,
        }
    }
}

impl TrackerConfig {
    pub fn correlation_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.correlation_window_ms as i64)
    }

    pub fn publish_grace(&self) -> Duration {
        Duration::from_millis(self.publish_grace_ms)
    }

    pub fn pending_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pending_ttl_secs as i64)
    }

    pub fn block_marker_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.block_marker_ttl_secs as i64)
    }

    pub fn published_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.published_ttl_secs as i64)
    }

    /// Parse tunables from TOML text. Missing keys take their defaults.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        let config: TrackerConfig = toml::from_str(text).map_err(|error| ConfigError::Parse {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.detail_scan_limit == 0 {
            return Err(
                ConfigError::Invalid("detail_scan_limit must be at least 1".into()).into(),
            );
        }
        if self.block_marker_ttl_secs == 0 {
            return Err(
                ConfigError::Invalid("block_marker_ttl_secs must be at least 1".into()).into(),
            );
        }
        Ok(())
    }
}

impl Config {
    /// Default data directory: `BUGBOT_DATA_DIR`, else the platform data dir.
    pub fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("BUGBOT_DATA_DIR") {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join("bugbot"))
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    /// Load configuration from environment and the data-dir config file.
    pub fn load() -> Result<Self> {
        let data_dir = Self::default_data_dir();
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        Self::load_with(data_dir, &config_path, false)
    }

    /// Load with tunables from a specific config file path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        Self::load_with(Self::default_data_dir(), path, true)
    }

    fn load_with(data_dir: PathBuf, config_path: &Path, required: bool) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

        let discord_token = std::env::var("DISCORD_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey("DISCORD_TOKEN".into()))?;

        let tracker = match std::fs::read_to_string(config_path) {
            Ok(text) => TrackerConfig::from_toml(&text, config_path)?,
            Err(error) if !required && error.kind() == std::io::ErrorKind::NotFound => {
                TrackerConfig::default()
            }
            Err(error) => {
                return Err(ConfigError::Load {
                    path: config_path.display().to_string(),
                    source: error.into(),
                }
                .into());
            }
        };

        Ok(Self {
            data_dir,
            discord_token,
            tracker,
        })
    }

    /// Path of the guild → channel mapping.
    pub fn guild_config_path(&self) -> PathBuf {
        self.data_dir.join("guild_config.json")
    }

    /// Path of the guild → blocked identifiers mapping.
    pub fn blocked_ids_path(&self) -> PathBuf {
        self.data_dir.join("blocked_ids.json")
    }

    /// Directory for rolling log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
