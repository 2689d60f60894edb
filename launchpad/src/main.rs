//! Launchpad Node
//!
//! Loads configuration, opens the ledger and runs the periodic sweeper
//! until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use launchpad::types::SystemClock;
use launchpad::{init_tracing, Launchpad, LaunchpadConfig, StorageConfig, SweeperService};

/// Launchpad node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "launchpad-node")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LAUNCHPAD_CONFIG")]
    config: Option<PathBuf>,

    /// sled ledger directory (overrides the configured storage)
    #[arg(long, env = "LAUNCHPAD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (overrides the configured level)
    #[arg(long)]
    log_level: Option<String>,

    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LaunchpadConfig::load(path)?,
        None => LaunchpadConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.storage = StorageConfig::Sled { path: dir };
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    init_tracing(&config.log_level)?;
    info!(storage = ?config.storage, "Starting launchpad node");

    let store = config.storage.open()?;
    let launchpad = Arc::new(Launchpad::new(store, Arc::new(SystemClock), &config)?);

    if args.once {
        let report = launchpad.sweep()?;
        info!(
            timers = report.temple.len(),
            awarded = report.awarded(),
            graduations = report.graduations.len(),
            "Sweep complete"
        );
        return Ok(());
    }

    let sweeper = SweeperService::new(launchpad, config.sweep_interval());
    sweeper.start().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    sweeper.stop().await;
    Ok(())
}
