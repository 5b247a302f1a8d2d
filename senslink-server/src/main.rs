//! SensLink bridge daemon entry point.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use senslink_common::init_tracing;
use senslink_server::bridge::SensorBridge;
use senslink_server::config::{ServerConfig, SourceMode};

/// Serial sensor discovery bridge.
#[derive(Parser, Debug)]
#[command(about = "Serial sensor discovery bridge", version)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "senslink.json5")]
    config: PathBuf,

    /// Serial device override (skips auto-detection).
    #[arg(long)]
    serial_port: Option<String>,

    /// Use the synthetic mock source instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load_or_default(&args.config)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if let Some(port) = args.serial_port {
        config.serial.port = Some(port);
    }
    if args.mock {
        config.source = SourceMode::Mock;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting senslink bridge"
    );

    let bridge = SensorBridge::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!("Bridge running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    bridge.shutdown().await;
    tracing::info!("Goodbye!");

    Ok(())
}
