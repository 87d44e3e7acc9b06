//! History command - list or export the caller's ledger entries

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Color};

use super::{get_context, sign_in, AuthArgs};
use crate::output;
use wallet_core::{LedgerEntry, WalletId};

fn entry_row(entry: &LedgerEntry, wallet: WalletId) -> Vec<Cell> {
    let net = entry.net_effect_on(wallet);
    let net_cell = if net.is_negative() {
        Cell::new(output::format_amount(net)).fg(Color::Red)
    } else {
        Cell::new(output::format_amount(net)).fg(Color::Green)
    };

    vec![
        Cell::new(entry.id),
        Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M:%S")),
        Cell::new(entry.source_wallet_id),
        Cell::new(entry.destination_wallet_id),
        net_cell,
        Cell::new(entry.request_id.as_deref().unwrap_or("")),
    ]
}

pub fn run(auth: &AuthArgs, limit: Option<usize>, format: &str, output_path: Option<&Path>) -> Result<()> {
    if !matches!(format, "table" | "json" | "csv") {
        bail!("Unknown format '{}'. Use table, json or csv", format);
    }
    if output_path.is_some() && format != "csv" {
        bail!("--output is only supported with --format csv");
    }

    let ctx = get_context()?;
    let password = auth.password()?;
    let claims = sign_in(&ctx, auth, &password);

    if format == "csv" {
        let wallet = claims?.acting_wallet(wallet_core::now())?;
        return match output_path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let written = ctx.history_service.export_csv(wallet, limit, BufWriter::new(file))?;
                output::success(&format!("Exported {} entries to {}", written, path.display()));
                Ok(())
            }
            None => {
                ctx.history_service
                    .export_csv(wallet, limit, std::io::stdout().lock())?;
                Ok(())
            }
        };
    }

    let outcome = claims.and_then(|claims| {
        let wallet = claims.acting_wallet(wallet_core::now())?;
        let pages = ctx.history_service.history(wallet)?;
        let entries = pages
            .take(limit.unwrap_or(usize::MAX))
            .collect::<wallet_core::domain::result::Result<Vec<_>>>()?;
        Ok((wallet, entries))
    });

    if format == "json" {
        return output::print_result(outcome.map(|(_, entries)| entries));
    }

    let (wallet, entries) = outcome?;
    if entries.is_empty() {
        output::info("No ledger entries for this wallet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Entry", "Time", "From", "To", "Amount", "Request ID"]);
    for entry in &entries {
        table.add_row(entry_row(entry, wallet));
    }
    println!("{}", table);
    println!("{} entries", entries.len());
    Ok(())
}
