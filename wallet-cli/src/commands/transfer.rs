//! Transfer command - move money from the caller's wallet to another

use anyhow::Result;

use super::{get_context, sign_in, AuthArgs};
use crate::output;
use wallet_core::services::TransferRequest;
use wallet_core::{Amount, WalletId};

pub fn run(
    to: i64,
    amount: &str,
    auth: &AuthArgs,
    request_id: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let password = auth.password()?;

    let outcome = sign_in(&ctx, auth, &password).and_then(|claims| {
        let source = claims.acting_wallet(wallet_core::now())?;
        let amount: Amount = amount.parse()?;
        let mut request = TransferRequest::new(source, WalletId::new(to), amount);
        if let Some(id) = request_id {
            request = request.with_request_id(id);
        }
        ctx.transfer_engine.execute(request)
    });

    if json {
        return output::print_result(outcome);
    }

    let entry = outcome?;
    output::success(&format!(
        "Transferred {} from wallet {} to wallet {}",
        output::format_amount(entry.amount),
        entry.source_wallet_id,
        entry.destination_wallet_id
    ));
    println!("  Ledger entry: {}", entry.id);
    if let Some(request_id) = &entry.request_id {
        println!("  Request ID:   {}", request_id);
    }
    Ok(())
}
