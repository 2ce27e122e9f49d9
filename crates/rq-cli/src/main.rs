//! rq CLI - Store-coordinated job queue
//!
//! # Usage
//!
//! ```bash
//! # Submit a job to the main group
//! rq enqueue orders-create --data '{"id": 42}'
//!
//! # Supervise workers on this host
//! rq master --max-workers 10 --budget 200
//!
//! # Inspect
//! rq queues
//! rq workers
//! rq failures --end 9
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod dispatch;
mod settings;

use commands::{close, enqueue, inspect, master, unit};
use settings::Settings;

/// rq - realtime, unique and delayed jobs over a shared store
#[derive(Parser)]
#[command(
    name = "rq",
    version,
    about = "rq - store-coordinated job queue",
    long_about = "rq queues jobs in a shared Redis store.\n\n\
                  A master per host launches budgeted worker processes as\n\
                  queues fill up; workers run each job through a handler\n\
                  executable and record failures in a ledger."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job
    #[command(name = "enqueue")]
    Enqueue(enqueue::EnqueueArgs),

    /// Supervise workers on this host
    #[command(name = "master")]
    Master(master::MasterArgs),

    /// Run a single unit (launched by the master)
    #[command(name = "unit")]
    Unit(unit::UnitArgs),

    /// Revoke worker identities
    #[command(name = "close")]
    Close(close::CloseArgs),

    /// Show the failure ledger
    #[command(name = "failures")]
    Failures(inspect::FailuresArgs),

    /// Show a queue's length
    #[command(name = "length")]
    Length(inspect::LengthArgs),

    /// List active queues
    #[command(name = "queues")]
    Queues(inspect::ListArgs),

    /// List live workers
    #[command(name = "workers")]
    Workers(inspect::ListArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    setup_logging(cli.verbose);

    let settings = &cli.settings;
    match cli.command {
        Commands::Enqueue(args) => enqueue::run(settings, args).await,
        Commands::Master(args) => master::run(settings, args).await,
        Commands::Unit(args) => unit::run(settings, args).await,
        Commands::Close(args) => close::run(settings, args).await,
        Commands::Failures(args) => inspect::failures(settings, args).await,
        Commands::Length(args) => inspect::length(settings, args).await,
        Commands::Queues(args) => inspect::queues(settings, args).await,
        Commands::Workers(args) => inspect::workers(settings, args).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(filter))
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_unit_args_parse_back() {
        let cli = Cli::try_parse_from([
            "rq",
            "--redis-url=redis://queue:6379",
            "--namespace=",
            "--budget=25",
            "unit",
            "--type",
            "realtime",
        ])
        .unwrap();

        assert_eq!(cli.settings.namespace.as_deref(), Some(""));
        assert_eq!(cli.settings.budget, Some(25));
        assert!(matches!(cli.command, Commands::Unit(_)));
    }

    #[test]
    fn test_enqueue_parses_kind() {
        let cli = Cli::try_parse_from([
            "rq", "enqueue", "orders-sync", "--kind", "unique", "--delay", "30",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Enqueue(_)));

        assert!(Cli::try_parse_from(["rq", "enqueue", "orders-sync", "--kind", "soon"]).is_err());
    }
}
