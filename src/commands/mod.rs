//! Command handlers for the CLI application.
//!
//! - `query`: read-only commands (info, battery, dpi, presets, ...)
//! - `set`: setting commands (set-dpi, set-presets, set-effect, ...)
//! - `watch`: notification stream
//! - `config`: configuration file

pub mod config;
pub mod query;
pub mod set;
pub mod watch;

use std::fmt::Display;
use std::path::PathBuf;

use hidapi::HidApi;
use razer_transport::{FeatureReportTransport, HidFeatureChannel, ProtocolError, RazerProtocol};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;

/// Result type for command handlers
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Settings shared by every command
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    pub device: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    /// Open the control interface as a feature-report transport
    pub fn open(&self) -> Result<impl RazerProtocol, Box<dyn std::error::Error>> {
        let path = self
            .device
            .as_ref()
            .or(self.config.device.as_ref())
            .ok_or("no device given (use --device or set `device` in the config)")?;
        let path = path
            .to_str()
            .ok_or_else(|| format!("device path {path:?} is not valid UTF-8"))?;

        let api = HidApi::new()?;
        let channel = HidFeatureChannel::open_path(&api, path)?;
        debug!("Opened {}", path);
        Ok(FeatureReportTransport::new(channel)
            .with_timing(self.config.poll_timing())
            .with_error_retry_budget(self.config.error_retry_budget))
    }

    /// Print `value` as JSON, or `text` otherwise
    pub fn emit<T: Serialize>(&self, value: &T, text: impl Display) -> CommandResult {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
        } else {
            println!("{text}");
        }
        Ok(())
    }
}

/// Treat "device cannot do this" as absent rather than failing the command
pub fn optional<T>(result: Result<T, ProtocolError>) -> Result<Option<T>, ProtocolError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ProtocolError::Rejected { .. } | ProtocolError::NotSupported(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
