//! Persistent driver configuration
//!
//! TOML file under the user config directory. Every key is optional; a
//! missing file or key falls back to the defaults below.

use razer_transport::protocol::{report_id, timing};
use razer_transport::{NotificationOptions, PollTiming};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Control interface node used when `--device` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Extra polls granted after a failure status
    pub error_retry_budget: u32,
    pub initial_poll_delay_ms: u64,
    pub retry_poll_delay_ms: u64,
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            log_level: "info".to_string(),
            error_retry_budget: 0,
            initial_poll_delay_ms: timing::INITIAL_POLL_DELAY_MS,
            retry_poll_delay_ms: timing::RETRY_POLL_DELAY_MS,
            notifications: NotificationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub report_id: u8,
    pub report_length: usize,
    pub stream_index: u8,
    pub bluetooth_hid_quirk: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        let options = NotificationOptions::default();
        Self {
            report_id: report_id::DEFAULT,
            report_length: options.report_length,
            stream_index: options.stream_index,
            bluetooth_hid_quirk: options.bluetooth_hid_quirk,
        }
    }
}

impl NotificationConfig {
    pub fn options(&self) -> NotificationOptions {
        NotificationOptions {
            stream_index: self.stream_index,
            report_id: self.report_id,
            bluetooth_hid_quirk: self.bluetooth_hid_quirk,
            report_length: self.report_length,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("razer-driver")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn poll_timing(&self) -> PollTiming {
        PollTiming {
            initial_delay: Duration::from_millis(self.initial_poll_delay_ms),
            retry_delay: Duration::from_millis(self.retry_poll_delay_ms),
        }
    }
}
