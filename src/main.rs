//! realtime-overlay - Floating transparent overlay for the OpenAI Realtime API
//!
//! Listens to meeting or microphone audio and streams the model's text
//! responses into an always-on-top transparent window, with global hotkeys,
//! a status-bar menu and automatic hiding while screen sharing.

mod app;
mod audio;
mod config;
mod controller;
mod detector;
mod hotkey;
mod overlay;
mod session;
mod shared;
mod tray;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::AppConfig;

/// realtime-overlay - AI responses over live audio
#[derive(Parser, Debug)]
#[command(name = "realtime-overlay")]
#[command(about = "Floating transparent overlay streaming OpenAI Realtime API responses")]
struct Args {
    /// Path to the config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List available audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Write a default config file to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    // List devices mode
    if args.list_devices {
        println!("Available audio input devices:");
        let devices = audio::list_input_devices()?;
        if devices.is_empty() {
            println!("  No input devices detected");
        } else {
            for name in devices {
                println!("  {name}");
            }
        }
        return Ok(());
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    if args.write_default_config {
        config::save_config(&AppConfig::default(), &config_path)?;
        println!("Wrote default config to {}", config_path.display());
        return Ok(());
    }

    info!("realtime-overlay starting...");

    let config = load_or_default_config(&config_path);

    app::run(config)
}

/// Load configuration from file or fall back to defaults; environment
/// variables override API credentials either way
fn load_or_default_config(path: &PathBuf) -> AppConfig {
    let mut config = if path.exists() {
        match config::load_config(path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Ignoring config file: {}", e);
                AppConfig::default()
            }
        }
    } else {
        info!("Using default configuration");
        AppConfig::default()
    };

    config.api.apply_env_overrides();
    config
}
