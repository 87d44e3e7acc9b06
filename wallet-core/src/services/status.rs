//! Status service - ledger-wide counts and totals

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbStore;
use crate::domain::Amount;

/// Status service for ledger summaries
pub struct StatusService {
    store: Arc<DuckDbStore>,
}

impl StatusService {
    pub fn new(store: Arc<DuckDbStore>) -> Self {
        Self { store }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let totals = self.store.totals()?;

        Ok(StatusSummary {
            total_users: totals.users,
            total_wallets: totals.wallets,
            total_ledger_entries: totals.ledger_entries,
            total_balance: totals.total_balance,
            total_deposited: totals.total_deposited,
            database: self
                .store
                .db_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_users: i64,
    pub total_wallets: i64,
    pub total_ledger_entries: i64,
    pub total_balance: Amount,
    pub total_deposited: Amount,
    pub database: String,
}

impl StatusSummary {
    /// Money cannot be created or destroyed by transfers, so the two totals
    /// must agree
    pub fn is_conserved(&self) -> bool {
        self.total_balance == self.total_deposited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{DepositService, RegistrationService, TransferEngine};
    use std::time::Duration;

    #[test]
    fn test_status_after_activity() {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        let registration = RegistrationService::new(store.clone(), chrono::Duration::minutes(10));
        let a = registration.register("A", "a@example.com", "password1").unwrap();
        let b = registration.register("B", "b@example.com", "password1").unwrap();

        let wait = Duration::from_millis(200);
        DepositService::new(store.clone(), wait)
            .deposit(a.wallet.id, Amount::from_minor(10_000))
            .unwrap();
        TransferEngine::new(store.clone(), wait)
            .transfer(a.wallet.id, b.wallet.id, Amount::from_minor(2_500))
            .unwrap();

        let status = StatusService::new(store).get_status().unwrap();
        assert_eq!(status.total_users, 2);
        assert_eq!(status.total_wallets, 2);
        assert_eq!(status.total_ledger_entries, 2);
        assert_eq!(status.total_balance, Amount::from_minor(10_000));
        assert!(status.is_conserved());
        assert_eq!(status.database, ":memory:");
    }
}
