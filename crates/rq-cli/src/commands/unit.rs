//! Unit command - Run one delay pass or one realtime worker
//!
//! Usually launched by `rq master`.
//!
//! Usage:
//! ```bash
//! rq unit --type delay
//! rq unit --type realtime --handlers-dir /srv/rq/handlers
//! ```

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

use rq_queue::{Shutdown, UnitKind, Worker};

use crate::dispatch::CommandDispatcher;
use crate::settings::Settings;

/// Arguments for the unit command
#[derive(Args)]
pub struct UnitArgs {
    /// delay or realtime
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    kind: UnitKind,
}

/// Run the unit command
pub async fn run(settings: &Settings, args: UnitArgs) -> Result<()> {
    let config = settings.resolve()?;
    let manager = settings.connect(&config).await?;

    let dispatcher = CommandDispatcher::new(settings.handlers_dir.clone());
    let worker = Worker::new(manager, Arc::new(dispatcher), &config);

    let exit = worker
        .run(args.kind, Shutdown::on_signal())
        .await
        .with_context(|| format!("{} unit failed", args.kind))?;

    tracing::info!(unit = %args.kind, exit = ?exit, "Unit finished");
    Ok(())
}
