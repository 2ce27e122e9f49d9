//! Inspection commands - Queues, workers, failures
//!
//! Usage:
//! ```bash
//! rq queues
//! rq workers
//! rq length orders
//! rq failures --start 0 --end 9
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use std::collections::BTreeMap;

use crate::settings::Settings;

/// Arguments for the failures command
#[derive(Args)]
pub struct FailuresArgs {
    /// First entry (0 is the newest)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    start: isize,

    /// Last entry, inclusive; -1 is the oldest
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    end: isize,

    /// Output raw JSON
    #[arg(long)]
    raw: bool,
}

/// Arguments for the length command
#[derive(Args)]
pub struct LengthArgs {
    /// Group name, or a full store key with --key
    target: String,

    /// Treat the target as a raw store key
    #[arg(long)]
    key: bool,
}

/// Arguments for the queues and workers commands
#[derive(Args)]
pub struct ListArgs {
    /// Output raw JSON
    #[arg(long)]
    raw: bool,
}

pub async fn failures(settings: &Settings, args: FailuresArgs) -> Result<()> {
    let config = settings.resolve()?;
    let manager = settings.connect(&config).await?;
    let list = manager
        .list_failures(args.start, args.end)
        .await
        .context("Failed to read failure ledger")?;

    if args.raw {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!("{} {}", "Failed jobs:".bold(), list.count.to_string().red());
    if list.entries.is_empty() {
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Job").fg(Color::Cyan),
            Cell::new("Reason").fg(Color::Cyan),
        ]);
    for record in &list.entries {
        table.add_row(vec![
            Cell::new(&record.data),
            Cell::new(&record.reason).fg(Color::Red),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn length(settings: &Settings, args: LengthArgs) -> Result<()> {
    let config = settings.resolve()?;
    let manager = settings.connect(&config).await?;

    let len = if args.key {
        manager.queue_length(&args.target).await
    } else {
        manager.group_length(&args.target).await
    }
    .context("Failed to read queue length")?;

    println!("{len}");
    Ok(())
}

pub async fn queues(settings: &Settings, args: ListArgs) -> Result<()> {
    let config = settings.resolve()?;
    let manager = settings.connect(&config).await?;
    let active = manager
        .active_queues()
        .await
        .context("Failed to list queues")?;

    if args.raw {
        println!("{}", serde_json::to_string_pretty(&active)?);
        return Ok(());
    }

    let mut lengths = BTreeMap::new();
    for key in active.keys() {
        lengths.insert(key.clone(), manager.queue_length(key).await?);
    }

    let mut table = stamped_table("Queue", Some("Jobs"));
    for (key, stamp) in &active {
        table.add_row(vec![
            Cell::new(key).fg(Color::Green),
            Cell::new(lengths.get(key).copied().unwrap_or_default()),
            Cell::new(format_stamp(*stamp)).fg(Color::Yellow),
        ]);
    }
    println!("{} {}", "Active queues:".bold(), active.len());
    println!("{table}");
    Ok(())
}

pub async fn workers(settings: &Settings, args: ListArgs) -> Result<()> {
    let config = settings.resolve()?;
    let manager = settings.connect(&config).await?;
    let active = manager
        .active_workers()
        .await
        .context("Failed to list workers")?;

    if args.raw {
        println!("{}", serde_json::to_string_pretty(&active)?);
        return Ok(());
    }

    let mut table = stamped_table("Identity", None);
    for (key, stamp) in &active {
        table.add_row(vec![
            Cell::new(key).fg(Color::Green),
            Cell::new(format_stamp(*stamp)).fg(Color::Yellow),
        ]);
    }
    println!("{} {}", "Live workers:".bold(), active.len());
    println!("{table}");
    Ok(())
}

fn stamped_table(first: &str, middle: Option<&str>) -> Table {
    let mut header = vec![Cell::new(first).fg(Color::Cyan)];
    if let Some(middle) = middle {
        header.push(Cell::new(middle).fg(Color::Cyan));
    }
    header.push(Cell::new("Since").fg(Color::Cyan));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn format_stamp(stamp: i64) -> String {
    chrono::DateTime::from_timestamp(stamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| stamp.to_string())
}
