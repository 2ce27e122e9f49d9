//! Master command - Supervise workers on this host
//!
//! Usage:
//! ```bash
//! rq master --max-workers 10 --budget 200
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use rq_queue::{Master, MasterExit, Shutdown};

use crate::settings::Settings;

/// Arguments for the master command
#[derive(Args)]
pub struct MasterArgs {
    /// Upper bound on live workers
    #[arg(long, value_name = "N")]
    max_workers: Option<usize>,

    /// Pause between idle iterations, in milliseconds
    #[arg(long, value_name = "MS")]
    idle_interval_ms: Option<u64>,
}

/// Run the master command
pub async fn run(settings: &Settings, args: MasterArgs) -> Result<()> {
    let mut config = settings.resolve()?;
    if let Some(max_workers) = args.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(idle) = args.idle_interval_ms {
        config.idle_interval_ms = idle;
    }

    config.validate().context("Invalid configuration")?;

    let spawner = settings.unit_spawner(&config)?;
    let manager = settings.connect(&config).await?;

    let master = Master::new(manager, Arc::new(spawner), &config);
    let exit = master
        .run(Shutdown::on_signal())
        .await
        .context("Master failed")?;

    match exit {
        MasterExit::AlreadyRunning => {
            println!("{} Already running!", "⚠".yellow().bold());
        }
        MasterExit::LostOwnership => {
            println!("{} Master identity revoked, stopped", "ℹ".blue().bold());
        }
        MasterExit::Shutdown => {
            println!("{} Master stopped", "✓".green().bold());
        }
    }
    Ok(())
}
