//! Output formatting utilities

use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use serde::Serialize;
use wallet_core::{Amount, OperationResult};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Amount with two decimal places
pub fn format_amount(amount: Amount) -> String {
    format!("{:.2}", amount.to_decimal())
}

/// Print a core outcome as an `OperationResult` JSON document
///
/// A failure is printed and then handed back, so the process still exits
/// non-zero.
pub fn print_result<T: Serialize>(result: wallet_core::domain::result::Result<T>) -> Result<()> {
    match result {
        Ok(data) => {
            println!("{}", serde_json::to_string_pretty(&OperationResult::ok(data))?);
            Ok(())
        }
        Err(e) => {
            let failed: OperationResult<T> = OperationResult::from_error(&e);
            println!("{}", serde_json::to_string_pretty(&failed)?);
            Err(e.into())
        }
    }
}
