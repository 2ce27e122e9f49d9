//! Enqueue command - Submit a job
//!
//! Usage:
//! ```bash
//! rq enqueue orders-create --data '{"id": 42}'
//! rq enqueue orders-sync --kind unique --delay 300
//! rq enqueue mail-remind --group mail --kind delay --delay 3600
//! ```

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};

use rq_queue::{EnqueueOutcome, JobKind, DEFAULT_GROUP};

use crate::settings::Settings;

/// Arguments for the enqueue command
#[derive(Args)]
pub struct EnqueueArgs {
    /// Job command as `group-method`
    cmd: String,

    /// Job data as a JSON object
    #[arg(long, short = 'd', default_value = "{}")]
    data: String,

    /// Routing group whose queue receives the job
    #[arg(long, short = 'g', default_value = DEFAULT_GROUP)]
    group: String,

    /// realtime, unique or delay
    #[arg(long, short = 'k', default_value = "realtime")]
    kind: JobKind,

    /// Seconds until a delayed job is due, or a unique job's lock lifetime
    #[arg(long, default_value_t = 0)]
    delay: u64,
}

/// Run the enqueue command. Prints the queue length, `-1` for a duplicate
/// unique job, or `0` when the store rejected the job.
pub async fn run(settings: &Settings, args: EnqueueArgs) -> Result<()> {
    let data = parse_data(&args.data)?;
    let config = settings.resolve()?;

    let outcome = async {
        let manager = settings.connect(&config).await?;
        manager
            .enqueue(&args.cmd, data, &args.group, args.kind, args.delay)
            .await
            .context("Failed to enqueue job")
    }
    .await;

    match outcome {
        Ok(outcome) => {
            if let EnqueueOutcome::Delayed { due_at, .. } = outcome {
                tracing::info!(due_at, "Job delayed");
            }
            println!("{}", outcome.code());
            Ok(())
        }
        Err(e) => {
            println!("0");
            Err(e)
        }
    }
}

fn parse_data(raw: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).with_context(|| format!("Invalid JSON: {raw}"))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => anyhow::bail!("Job data must be a JSON object, got {other}"),
    }
}
