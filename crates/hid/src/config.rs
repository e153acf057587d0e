//! HID layer configuration management

use crate::driver::BLOCK_FOREVER;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HidConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Per-device I/O settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Timeout of each poll loop read, which bounds how long a stop waits
    #[serde(default = "DeviceSettings::default_poll_interval")]
    pub poll_interval_ms: u32,
    /// Buffer allocated for each input report
    #[serde(default = "DeviceSettings::default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Timeout used by `read(None)`; -1 blocks until a report arrives
    #[serde(default = "DeviceSettings::default_read_timeout")]
    pub default_read_timeout_ms: i32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval(),
            read_buffer_size: Self::default_read_buffer_size(),
            default_read_timeout_ms: Self::default_read_timeout(),
        }
    }
}

impl DeviceSettings {
    fn default_poll_interval() -> u32 {
        50
    }

    fn default_read_buffer_size() -> usize {
        2048
    }

    fn default_read_timeout() -> i32 {
        BLOCK_FOREVER
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    /// Poll interval as a native read timeout
    pub(crate) fn poll_timeout_ms(&self) -> i32 {
        i32::try_from(self.poll_interval_ms).unwrap_or(i32::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl HidConfig {
    /// Load configuration from `path`, or the default location when `None`
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => {
                let default = Self::default_path();
                if !default.exists() {
                    return Err(anyhow!("No configuration file found, using defaults"));
                }
                default
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: HidConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("hid-async").join("config.toml")
        } else {
            PathBuf::from(".config/hid-async/config.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.log_level,
                valid_levels.join(", ")
            ));
        }

        let device = &self.device;
        if !(1..=1000).contains(&device.poll_interval_ms) {
            return Err(anyhow!(
                "Invalid poll_interval_ms {}, must be between 1 and 1000",
                device.poll_interval_ms
            ));
        }
        if !(1..=65536).contains(&device.read_buffer_size) {
            return Err(anyhow!(
                "Invalid read_buffer_size {}, must be between 1 and 65536",
                device.read_buffer_size
            ));
        }
        if device.default_read_timeout_ms < BLOCK_FOREVER {
            return Err(anyhow!(
                "Invalid default_read_timeout_ms {}, must be -1 or greater",
                device.default_read_timeout_ms
            ));
        }

        Ok(())
    }

    /// Install the tracing subscriber at the configured level
    pub fn init_logging(&self) -> common::Result<()> {
        common::setup_logging(&self.logging.log_level)
    }
}
