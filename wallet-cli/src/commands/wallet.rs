//! Wallet command - show the caller's wallet

use anyhow::Result;
use colored::Colorize;

use super::{get_context, sign_in, AuthArgs};
use crate::output;

pub fn run(auth: &AuthArgs, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let password = auth.password()?;
    let outcome = sign_in(&ctx, auth, &password)
        .and_then(|claims| ctx.registration_service.wallet_details(&claims));

    if json {
        return output::print_result(outcome);
    }

    let details = outcome?;
    println!("{}", "Wallet".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Wallet ID".to_string(), details.wallet.id.to_string()]);
    table.add_row(vec!["Owner".to_string(), details.owner.name.clone()]);
    table.add_row(vec!["Email".to_string(), details.owner.email.clone()]);
    table.add_row(vec![
        "Balance".to_string(),
        output::format_amount(details.wallet.balance),
    ]);
    table.add_row(vec![
        "Created".to_string(),
        details.wallet.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]);
    println!("{}", table);
    Ok(())
}
