//! Register command - create a user and their wallet

use anyhow::Result;
use colored::Colorize;

use super::{get_context, read_password};
use crate::output;

pub fn run(name: &str, email: &str, password: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let password = read_password(password, true)?;
    let outcome = ctx.registration_service.register(name, email, &password);

    if json {
        return output::print_result(outcome);
    }

    let registration = outcome?;
    output::success(&format!("Registered {}", registration.user.email));
    println!("  User ID:   {}", registration.user.id);
    println!("  Wallet ID: {}", registration.wallet.id.to_string().bold());
    Ok(())
}
