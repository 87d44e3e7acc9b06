//! Deposit command - credit the caller's wallet from outside the system

use anyhow::Result;

use super::{get_context, sign_in, AuthArgs};
use crate::output;
use wallet_core::services::DepositRequest;
use wallet_core::Amount;

pub fn run(amount: &str, auth: &AuthArgs, request_id: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let password = auth.password()?;

    let outcome = sign_in(&ctx, auth, &password).and_then(|claims| {
        let wallet = claims.acting_wallet(wallet_core::now())?;
        let amount: Amount = amount.parse()?;
        let mut request = DepositRequest::new(wallet, amount);
        if let Some(id) = request_id {
            request = request.with_request_id(id);
        }
        ctx.deposit_service.execute(request)
    });

    if json {
        return output::print_result(outcome);
    }

    let wallet = outcome?;
    output::success(&format!("Deposited into wallet {}", wallet.id));
    println!("  New balance: {}", output::format_amount(wallet.balance));
    Ok(())
}
