//! Razer Peripheral Driver CLI
//!
//! A command-line interface for Razer mice, receivers and docks speaking the
//! feature-report protocol over hidraw.

use clap::Parser;
use tracing::debug;

// CLI definitions
mod cli;
use cli::{Cli, Commands, ConfigCommands};

// Command handlers
mod commands;
mod config;

use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    // Initialize logging
    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    debug!("Loaded config from {:?}", config_path);

    let ctx = commands::Context {
        config,
        config_path,
        device: cli.device,
        json: cli.json,
    };

    match cli.command {
        // === Query Commands ===
        Commands::Info => commands::query::info(&ctx).await?,
        Commands::Battery => commands::query::battery(&ctx).await?,
        Commands::Dpi { persisted } => commands::query::dpi(&ctx, persisted).await?,
        Commands::Presets { v1 } => commands::query::presets(&ctx, v1).await?,
        Commands::Brightness { led, v1, persisted } => {
            commands::query::brightness(&ctx, led, v1, persisted).await?
        }
        Commands::Effect { led, v1, persisted } => {
            commands::query::effect(&ctx, led, v1, persisted).await?
        }
        Commands::Polling => commands::query::polling(&ctx).await?,
        Commands::Idle => commands::query::idle(&ctx).await?,

        // === Set Commands ===
        Commands::SetDpi { x, y, persist } => commands::set::set_dpi(&ctx, x, y, persist).await?,
        Commands::SetPresets {
            active,
            presets,
            v1,
            persist,
        } => commands::set::set_presets(&ctx, active, &presets, v1, persist).await?,
        Commands::SetBrightness {
            value,
            led,
            v1,
            persist,
        } => commands::set::set_brightness(&ctx, value, led, v1, persist).await?,
        Commands::SetEffect {
            kind,
            colors,
            v1,
            persist,
        } => commands::set::set_effect(&ctx, &kind, &colors, v1, persist).await?,
        Commands::SetPolling { divider } => commands::set::set_polling(&ctx, divider).await?,
        Commands::SetIdle { seconds } => commands::set::set_idle(&ctx, seconds).await?,

        // === Notifications ===
        Commands::Watch { path, stream } => commands::watch::watch(&ctx, &path, stream).await?,

        // === Configuration ===
        Commands::Config(ConfigCommands::Init { force }) => commands::config::init(&ctx, force)?,
        Commands::Config(ConfigCommands::Show) => commands::config::show(&ctx)?,
    }

    Ok(())
}
