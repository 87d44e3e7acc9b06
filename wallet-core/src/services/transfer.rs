//! Transfer engine - atomic wallet-to-wallet movements
//!
//! A transfer debits one wallet, credits another and appends one ledger
//! entry inside a single store scope. Both rows are locked in ascending id
//! order before the scope reads anything, whatever the transfer direction.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::result::{Error, Result};
use crate::domain::{Amount, LedgerEntry, NewLedgerEntry, Wallet, WalletId};
use crate::ports::LedgerStore;

/// A transfer to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source: WalletId,
    pub destination: WalletId,
    pub amount: Amount,
    /// Caller-chosen key; replaying the same request returns the original entry
    pub request_id: Option<String>,
}

impl TransferRequest {
    pub fn new(source: WalletId, destination: WalletId, amount: Amount) -> Self {
        Self {
            source,
            destination,
            amount,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    fn validate(&self) -> Result<()> {
        self.amount.ensure_positive()?;
        if self.source == self.destination {
            return Err(Error::SameWalletTransfer(self.source));
        }
        for id in [self.source, self.destination] {
            if id.is_external() {
                return Err(Error::WalletNotFound(id));
            }
        }
        validate_request_id(self.request_id.as_deref())
    }
}

pub(crate) fn validate_request_id(request_id: Option<&str>) -> Result<()> {
    match request_id {
        Some(id) if id.trim().is_empty() => Err(Error::validation("request id cannot be empty")),
        _ => Ok(()),
    }
}

/// Check a stored entry against a replayed request
pub(crate) fn replayed(
    existing: LedgerEntry,
    source: WalletId,
    destination: WalletId,
    amount: Amount,
) -> Result<LedgerEntry> {
    if !existing.matches(source, destination, amount) {
        return Err(Error::validation(format!(
            "request id '{}' was already used for a different movement",
            existing.request_id.as_deref().unwrap_or_default()
        )));
    }
    debug!(entry_id = %existing.id, "request replayed, nothing changed");
    Ok(existing)
}

pub(crate) fn take_wallet(wallets: &[Wallet], id: WalletId) -> Result<&Wallet> {
    wallets
        .iter()
        .find(|w| w.id == id)
        .ok_or(Error::WalletNotFound(id))
}

/// Transfer engine
///
/// Holds no state between calls beyond the store handle and the lock wait
/// bound; one engine can serve any number of threads.
pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    lock_timeout: Duration,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock_timeout,
        }
    }

    /// Move `amount` from `from` to `to`
    pub fn transfer(&self, from: WalletId, to: WalletId, amount: Amount) -> Result<LedgerEntry> {
        self.execute(TransferRequest::new(from, to, amount))
    }

    /// Execute a transfer request
    ///
    /// Either both balances change and one entry is appended, or nothing
    /// changes and an error is returned.
    pub fn execute(&self, request: TransferRequest) -> Result<LedgerEntry> {
        request.validate()?;

        let mut scope = self.store.begin()?;
        let wallets = scope.lock_wallets(&[request.source, request.destination], self.lock_timeout)?;

        if let Some(request_id) = request.request_id.as_deref() {
            if let Some(existing) = scope.find_entry_by_request_id(request_id)? {
                return replayed(existing, request.source, request.destination, request.amount);
            }
        }

        let source = take_wallet(&wallets, request.source)?;
        let destination = take_wallet(&wallets, request.destination)?;

        if source.balance < request.amount {
            return Err(Error::InsufficientFunds {
                wallet_id: source.id,
                available: source.balance,
                requested: request.amount,
            });
        }

        let source_balance = source.balance.checked_sub(request.amount)?;
        let destination_balance = destination.balance.checked_add(request.amount)?;

        scope.set_balance(source.id, source_balance)?;
        scope.set_balance(destination.id, destination_balance)?;
        let entry = scope.append_entry(&NewLedgerEntry {
            source_wallet_id: source.id,
            destination_wallet_id: destination.id,
            amount: request.amount,
            request_id: request.request_id.clone(),
            timestamp: crate::now(),
        })?;
        scope.commit()?;

        info!(
            entry_id = %entry.id,
            source = %entry.source_wallet_id,
            destination = %entry.destination_wallet_id,
            "transfer committed"
        );
        Ok(entry)
    }
}
