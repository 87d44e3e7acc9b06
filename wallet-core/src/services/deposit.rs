//! Deposit service - money entering the system from outside

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::domain::result::{Error, Result};
use crate::domain::{Amount, NewLedgerEntry, Wallet, WalletId};
use crate::ports::LedgerStore;
use crate::services::transfer::{replayed, take_wallet, validate_request_id};

/// A deposit to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub wallet: WalletId,
    pub amount: Amount,
    pub request_id: Option<String>,
}

impl DepositRequest {
    pub fn new(wallet: WalletId, amount: Amount) -> Self {
        Self {
            wallet,
            amount,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Credits a single wallet under its row lock and records the movement
/// with the external source
pub struct DepositService {
    store: Arc<dyn LedgerStore>,
    lock_timeout: Duration,
}

impl DepositService {
    pub fn new(store: Arc<dyn LedgerStore>, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock_timeout,
        }
    }

    /// Add `amount` to a wallet, returning the updated wallet
    pub fn deposit(&self, wallet: WalletId, amount: Amount) -> Result<Wallet> {
        self.execute(DepositRequest::new(wallet, amount))
    }

    pub fn execute(&self, request: DepositRequest) -> Result<Wallet> {
        request.amount.ensure_positive()?;
        if request.wallet.is_external() {
            return Err(Error::WalletNotFound(request.wallet));
        }
        validate_request_id(request.request_id.as_deref())?;

        let mut scope = self.store.begin()?;
        let wallets = scope.lock_wallets(&[request.wallet], self.lock_timeout)?;
        let wallet = take_wallet(&wallets, request.wallet)?;

        if let Some(request_id) = request.request_id.as_deref() {
            if let Some(existing) = scope.find_entry_by_request_id(request_id)? {
                replayed(existing, WalletId::EXTERNAL, request.wallet, request.amount)?;
                return Ok(wallet.clone());
            }
        }

        let balance = wallet.balance.checked_add(request.amount)?;
        scope.set_balance(wallet.id, balance)?;
        let entry = scope.append_entry(&NewLedgerEntry {
            source_wallet_id: WalletId::EXTERNAL,
            destination_wallet_id: wallet.id,
            amount: request.amount,
            request_id: request.request_id.clone(),
            timestamp: crate::now(),
        })?;
        scope.commit()?;

        info!(entry_id = %entry.id, wallet = %wallet.id, "deposit committed");
        Ok(Wallet {
            balance,
            ..wallet.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbStore;
    use crate::domain::NewUser;

    fn setup() -> (Arc<DuckDbStore>, WalletId) {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        let mut scope = store.begin().unwrap();
        let user = scope
            .insert_user(&NewUser {
                name: "Test".to_string(),
                email: "z@example.com".to_string(),
                password_hash: "$argon2id$stub".to_string(),
            })
            .unwrap();
        let wallet = scope.insert_wallet(user.id).unwrap();
        scope.commit().unwrap();
        (store, wallet.id)
    }

    fn service(store: &Arc<DuckDbStore>) -> DepositService {
        DepositService::new(store.clone(), Duration::from_millis(500))
    }

    #[test]
    fn test_deposit_credits_wallet_and_records_external_source() {
        let (store, z) = setup();

        let wallet = service(&store).deposit(z, Amount::from_minor(5_000)).unwrap();
        assert_eq!(wallet.balance, Amount::from_minor(5_000));
        assert_eq!(store.find_wallet(z).unwrap().unwrap().balance, Amount::from_minor(5_000));

        let entries = store.history_page(z, None, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_deposit());
        assert_eq!(entries[0].destination_wallet_id, z);
        assert_eq!(entries[0].amount, Amount::from_minor(5_000));
    }

    #[test]
    fn test_deposit_validation() {
        let (store, z) = setup();
        let service = service(&store);

        assert!(matches!(service.deposit(z, Amount::ZERO), Err(Error::InvalidAmount(_))));
        assert!(matches!(
            service.deposit(z, Amount::from_minor(-5)),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            service.deposit(WalletId::new(77), Amount::from_minor(5)),
            Err(Error::WalletNotFound(_))
        ));
        assert!(matches!(
            service.deposit(WalletId::EXTERNAL, Amount::from_minor(5)),
            Err(Error::WalletNotFound(_))
        ));
        assert!(store.history_page(z, None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_deposit_replay_does_not_credit_twice() {
        let (store, z) = setup();
        let service = service(&store);
        let request = DepositRequest::new(z, Amount::from_minor(900)).with_request_id("topup-7");

        service.execute(request.clone()).unwrap();
        let replay = service.execute(request).unwrap();

        assert_eq!(replay.balance, Amount::from_minor(900));
        assert_eq!(store.history_page(z, None, 10).unwrap().len(), 1);
    }
}
