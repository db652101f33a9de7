// CLI definitions using clap

use clap::{Parser, Subcommand};
use razer_transport::LedId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "razer_driver")]
#[command(author, version, about = "Userspace driver for Razer mice, receivers and docks")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ~/.config/razer-driver/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Control interface node, e.g. /dev/hidraw3 (overrides the config)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub device: Option<PathBuf>,

    /// Log protocol traffic
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Query Commands ===
    /// Handshake and print serial number, firmware and pairing state
    #[command(visible_alias = "i")]
    Info,

    /// Get battery level and charging state
    #[command(visible_aliases = ["bat", "b"])]
    Battery,

    /// Get current sensor resolution
    Dpi {
        /// Read the value saved on the device
        #[arg(long)]
        persisted: bool,
    },

    /// Get stored DPI presets
    Presets {
        /// Use the legacy preset commands
        #[arg(long)]
        v1: bool,
    },

    /// Get lighting brightness (0-255)
    #[command(visible_alias = "br")]
    Brightness {
        /// Lighting zone (name or numeric ID)
        #[arg(long)]
        led: Option<LedId>,
        /// Use the legacy lighting commands
        #[arg(long)]
        v1: bool,
        #[arg(long)]
        persisted: bool,
    },

    /// Get lighting effect
    Effect {
        #[arg(long)]
        led: Option<LedId>,
        #[arg(long)]
        v1: bool,
        #[arg(long)]
        persisted: bool,
    },

    /// Get polling rate
    #[command(visible_aliases = ["poll", "hz"])]
    Polling,

    /// Get idle time before sleep
    Idle,

    // === Set Commands ===
    /// Set sensor resolution
    SetDpi {
        x: u16,
        /// Vertical resolution (defaults to X)
        y: Option<u16>,
        /// Also save to the device
        #[arg(long)]
        persist: bool,
    },

    /// Replace stored DPI presets
    SetPresets {
        /// Preset selected after the write (1-based)
        active: u8,
        /// Comma-separated presets, e.g. 800,1600x1200,3200
        presets: String,
        #[arg(long)]
        v1: bool,
        #[arg(long)]
        persist: bool,
    },

    /// Set lighting brightness (0-255)
    SetBrightness {
        value: u8,
        #[arg(long)]
        led: Option<LedId>,
        #[arg(long)]
        v1: bool,
        #[arg(long)]
        persist: bool,
    },

    /// Set lighting effect
    SetEffect {
        /// disabled, static, pulse, two-color-pulse, random-pulse, spectrum,
        /// wave, reactive
        kind: String,
        /// Effect colors as RRGGBB
        colors: Vec<String>,
        #[arg(long)]
        v1: bool,
        #[arg(long)]
        persist: bool,
    },

    /// Set polling rate divider (1 = 1000 Hz, 2 = 500 Hz, 8 = 125 Hz)
    SetPolling {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=8))]
        divider: u8,
    },

    /// Set idle time before sleep
    SetIdle { seconds: u16 },

    // === Notifications ===
    /// Stream device notifications (DPI buttons, pairing, battery, power)
    #[command(visible_alias = "w")]
    Watch {
        /// Notification interface node, e.g. /dev/hidraw4
        path: PathBuf,
        /// Second notification stream of a dock
        #[arg(long, default_value = "1")]
        stream: u8,
    },

    // === Configuration ===
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the active configuration
    Show,
}
