//! Close command - Revoke worker identities
//!
//! Usage:
//! ```bash
//! rq close            # every worker and the master on this host
//! rq close 9f86d081   # one worker
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::settings::Settings;

/// Arguments for the close command
#[derive(Args)]
pub struct CloseArgs {
    /// Worker identity; omit to close every identity on this host
    #[arg(default_value = "")]
    identity: String,
}

/// Run the close command
pub async fn run(settings: &Settings, args: CloseArgs) -> Result<()> {
    let config = settings.resolve()?;
    let manager = settings.connect(&config).await?;

    let closed = manager
        .close_worker(&args.identity)
        .await
        .context("Failed to close workers")?;

    println!(
        "{} Closed {} identit{}; workers stop after their current job",
        "✓".green().bold(),
        closed,
        if closed == 1 { "y" } else { "ies" }
    );
    Ok(())
}
