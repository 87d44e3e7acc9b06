//! Status command - show ledger totals

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Wallet Ledger Status".bold());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec!["Users", &status.total_users.to_string()]);
    table.add_row(vec!["Wallets", &status.total_wallets.to_string()]);
    table.add_row(vec!["Ledger Entries", &status.total_ledger_entries.to_string()]);
    table.add_row(vec!["Total Balance", &output::format_amount(status.total_balance)]);
    table.add_row(vec!["Total Deposited", &output::format_amount(status.total_deposited)]);

    println!("{}", table);
    println!();
    println!("Database: {}", status.database);

    if !status.is_conserved() {
        output::warning("Balances do not add up to deposits; run `wl doctor` for details");
    }

    Ok(())
}
