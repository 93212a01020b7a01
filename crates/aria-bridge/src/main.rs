// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ARIA Relay Bridge CLI
//!
//! Forward ARIA sensor reports from a serial relay to a messaging channel.
//!
//! # Usage
//!
//! ```bash
//! # Bridge with flags only
//! aria-bridge -p /dev/ttyUSB0 -i my-device -c 0123456789abcdefghij
//!
//! # Using configuration file, overriding the port
//! aria-bridge --config bridge.toml -p COM3
//!
//! # Generate and check a configuration file
//! aria-bridge gen-config -o bridge.toml
//! aria-bridge validate -c bridge.toml
//! ```

use anyhow::{bail, Context, Result};
use aria_bridge::{
    serial, Bridge, BridgeConfig, ChannelId, CloudConfig, MessagingClient, StopHandle,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ARIA Relay Bridge
#[derive(Parser, Debug)]
#[command(name = "aria-bridge")]
#[command(author = "naskel.com")]
#[command(about = "Publish TWELITE ARIA sensor reports from a serial relay to a cloud channel")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the relay
    #[arg(short, long)]
    port: Option<String>,

    /// Destination channel ID (20 characters of [0-9a-v])
    #[arg(short, long)]
    channel: Option<String>,

    /// Client ID registered with the authorization server
    #[arg(short = 'i', long)]
    client_id: Option<String>,

    /// RSA private key (PEM) used to sign client assertions
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "bridge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        init_logging(args.log_level.as_deref().unwrap_or("info"));
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;
    init_logging(&config.log_level);
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = %config.serial.port,
        client_id = %config.cloud.client_id,
        channel = %config.cloud.channel_id,
        "Starting ARIA bridge"
    );

    let mut client = MessagingClient::from_config(&config.cloud).with_context(|| {
        format!(
            "Failed to set up cloud client (key: {})",
            config.cloud.private_key_path.display()
        )
    })?;

    // Not fatal: the first publish requests a token again.
    if let Err(e) = client.tokens_mut().refresh() {
        tracing::warn!(error = %e, "Initial token request failed");
    }

    let reader = serial::open_buffered(&config.serial)
        .with_context(|| format!("Failed to open serial port {}", config.serial.port))?;

    let mut bridge = Bridge::new(reader, client, config.cloud.channel_id.clone());
    ctrlc_handler(bridge.stop_handle());

    let stats = bridge.run().context("Bridge error")?;
    tracing::info!(
        lines_read = stats.lines_read,
        frames_published = stats.frames_published,
        frames_skipped = stats.frames_skipped,
        publish_failures = stats.publish_failures,
        uptime_secs = stats.uptime_secs,
        "Bridge shutdown complete"
    );

    Ok(())
}

/// Load the config file (if any) and apply command-line overrides.
fn build_config(args: &Args) -> Result<BridgeConfig> {
    let mut config = match args.config {
        Some(ref path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<BridgeConfig>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => {
            let Some(ref client_id) = args.client_id else {
                bail!("Missing --client-id (or use --config)");
            };
            let Some(ref channel) = args.channel else {
                bail!("Missing --channel (or use --config)");
            };
            let channel = ChannelId::parse(channel)?;
            BridgeConfig::new(String::new(), CloudConfig::new(client_id.clone(), channel))
        }
    };

    if let Some(ref port) = args.port {
        config.serial.port = port.clone();
    }
    if let Some(ref client_id) = args.client_id {
        config.cloud.client_id = client_id.clone();
    }
    if let Some(ref channel) = args.channel {
        config.cloud.channel_id = ChannelId::parse(channel)?;
    }
    if let Some(ref key) = args.key {
        config.cloud.private_key_path = key.clone();
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }

    Ok(config)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn cmd_gen_config(output: PathBuf) -> Result<()> {
    let channel = ChannelId::parse("0123456789abcdefghij")?;
    let config = BridgeConfig::new("/dev/ttyUSB0", CloudConfig::new("my-device", channel));

    let toml_str = toml::to_string_pretty(&config)?;
    let content = format!(
        r#"# ARIA Bridge Configuration
# Generated by aria-bridge gen-config

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<()> {
    match BridgeConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Serial:    {} @ {} baud", config.serial.port, config.serial.baud_rate);
            println!("Client:    {}", config.cloud.client_id);
            println!("Channel:   {}", config.cloud.channel_id);
            println!("Key:       {}", config.cloud.private_key_path.display());
            println!("Auth:      {}", config.cloud.auth_url);
            println!("Messaging: {}", config.cloud.messaging_url);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

/// Setup Ctrl+C handler.
fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    });
}
