//! Logs command - view and manage application logs

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use dialoguer::Confirm;

use super::get_data_dir;
use wallet_core::services::logging::now_ms;
use wallet_core::{EntryPoint, LoggingService};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear old log entries
    Clear {
        /// Delete logs older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show log statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Uses the process logger when it is open; logs.duckdb is opened once per process
pub fn run(command: LogsCommands, logger: Option<&LoggingService>) -> Result<()> {
    let opened;
    let service = match logger {
        Some(service) => service,
        None => {
            let data_dir = get_data_dir()?;
            opened = LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))?;
            &opened
        }
    };

    match command {
        LogsCommands::List { limit, errors, json } => list(service, limit, errors, json),
        LogsCommands::Clear { older_than_days, force, json } => {
            clear(service, older_than_days, force, json)
        }
        LogsCommands::Stats { json } => stats(service, json),
    }
}

fn list(service: &LoggingService, limit: usize, errors: bool, json: bool) -> Result<()> {
    let entries = if errors {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Entry", "Event", "Command", "Error"]);

    for entry in &entries {
        let error = entry
            .error_kind
            .as_deref()
            .or(entry.error_message.as_deref())
            .map(|e| e.red().to_string())
            .unwrap_or_default();

        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.entry_point.clone(),
            entry.event.clone(),
            entry.command.clone().unwrap_or_default(),
            error,
        ]);
    }

    println!("{}", table);

    if !errors {
        let recent_errors = service.get_errors(3)?;
        if !recent_errors.is_empty() {
            println!();
            println!("{}", "Recent Errors:".red().bold());
            for err in &recent_errors {
                println!(
                    "  {} [{}]: {}",
                    format_timestamp(err.timestamp).dimmed(),
                    err.command.as_deref().unwrap_or(&err.event),
                    err.error_message
                        .as_deref()
                        .or(err.error_kind.as_deref())
                        .unwrap_or("Unknown error")
                );
            }
        }
    }

    Ok(())
}

fn clear(service: &LoggingService, older_than_days: u64, force: bool, json: bool) -> Result<()> {
    let cutoff_ms = now_ms() - older_than_days as i64 * DAY_MS;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete logs older than {} days?", older_than_days))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let deleted = service.delete_before(cutoff_ms)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        println!("Deleted {} log entries", deleted);
    }
    Ok(())
}

fn stats(service: &LoggingService, json: bool) -> Result<()> {
    let total = service.count()?;
    let events = service.event_counts()?;
    let db_path = service.db_path();
    let size_bytes = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    if json {
        let by_event: serde_json::Map<String, serde_json::Value> = events
            .iter()
            .map(|(event, n)| (event.clone(), serde_json::Value::from(*n)))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "total_entries": total,
                "events": by_event,
                "database_path": db_path.to_string_lossy(),
                "database_size_bytes": size_bytes
            })
        );
        return Ok(());
    }

    println!("{}", "Log Statistics".bold());
    println!("  Total entries: {}", total);
    for (event, n) in &events {
        println!("  {}: {}", event, n);
    }
    println!("  Database: {}", db_path.display());
    println!("  Size: {} bytes", size_bytes);
    Ok(())
}
