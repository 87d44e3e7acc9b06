//! Doctor service - ledger health checks

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbStore;

/// Doctor service for health checks
pub struct DoctorService {
    store: Arc<DuckDbStore>,
}

impl DoctorService {
    pub fn new(store: Arc<DuckDbStore>) -> Self {
        Self { store }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = HashMap::new();

        let negative = self.store.negative_balances()?;
        checks.insert(
            "negative_balances".to_string(),
            CheckResult::from_findings(
                Severity::Error,
                "No wallet holds a negative balance",
                format!("{} wallet(s) hold a negative balance", negative.len()),
                negative
                    .iter()
                    .map(|(id, balance)| json!({"wallet_id": id, "balance": balance.to_string()}))
                    .collect(),
            ),
        );

        let unreconciled = self.store.unreconciled_wallets()?;
        checks.insert(
            "ledger_reconciliation".to_string(),
            CheckResult::from_findings(
                Severity::Error,
                "Every balance matches its ledger entries",
                format!("{} wallet(s) disagree with the ledger", unreconciled.len()),
                unreconciled
                    .iter()
                    .map(|u| {
                        json!({
                            "wallet_id": u.wallet_id,
                            "balance": u.balance.to_string(),
                            "ledger_net": u.ledger_net.to_string()
                        })
                    })
                    .collect(),
            ),
        );

        let walletless = self.store.users_without_wallet()?;
        checks.insert(
            "users_without_wallet".to_string(),
            CheckResult::from_findings(
                Severity::Warning,
                "Every user owns a wallet",
                format!("{} user(s) have no wallet", walletless.len()),
                walletless.iter().map(|id| json!({"user_id": id})).collect(),
            ),
        );

        let dangling = self.store.dangling_entries()?;
        checks.insert(
            "dangling_entries".to_string(),
            CheckResult::from_findings(
                Severity::Error,
                "All ledger entries reference existing wallets",
                format!("{} ledger entries reference missing wallets", dangling.len()),
                dangling.iter().map(|id| json!({"entry_id": id})).collect(),
            ),
        );

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }
}

enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: HashMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn from_findings(
        severity: Severity,
        pass_message: &str,
        fail_message: String,
        findings: Vec<serde_json::Value>,
    ) -> Self {
        if findings.is_empty() {
            return Self {
                status: "pass".to_string(),
                message: pass_message.to_string(),
                details: None,
            };
        }
        let status = match severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        Self {
            status: status.to_string(),
            message: fail_message,
            details: Some(findings),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, NewUser};
    use crate::ports::LedgerStore;
    use crate::services::DepositService;
    use std::time::Duration;

    fn store_with_wallet() -> (Arc<DuckDbStore>, crate::domain::WalletId) {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        let mut scope = store.begin().unwrap();
        let user = scope
            .insert_user(&NewUser {
                name: "Test".to_string(),
                email: "d@example.com".to_string(),
                password_hash: "$argon2id$stub".to_string(),
            })
            .unwrap();
        let wallet = scope.insert_wallet(user.id).unwrap();
        scope.commit().unwrap();
        (store, wallet.id)
    }

    #[test]
    fn test_healthy_ledger_passes() {
        let (store, wallet) = store_with_wallet();
        DepositService::new(store.clone(), Duration::from_millis(200))
            .deposit(wallet, Amount::from_minor(1_500))
            .unwrap();

        let result = DoctorService::new(store).run_checks().unwrap();
        assert!(result.is_healthy());
        assert_eq!(result.summary.passed, 4);
        assert_eq!(result.checks["ledger_reconciliation"].status, "pass");
    }

    #[test]
    fn test_balance_without_ledger_entry_is_flagged() {
        let (store, wallet) = store_with_wallet();
        let mut scope = store.begin().unwrap();
        scope.lock_wallets(&[wallet], Duration::from_millis(200)).unwrap();
        scope.set_balance(wallet, Amount::from_minor(42)).unwrap();
        scope.commit().unwrap();

        let result = DoctorService::new(store).run_checks().unwrap();
        assert!(!result.is_healthy());
        let check = &result.checks["ledger_reconciliation"];
        assert_eq!(check.status, "error");
        assert_eq!(check.details.as_ref().unwrap()[0]["ledger_net"], "0.00");
    }

    #[test]
    fn test_user_without_wallet_is_a_warning() {
        let (store, _) = store_with_wallet();
        let mut scope = store.begin().unwrap();
        scope
            .insert_user(&NewUser {
                name: "Lonely".to_string(),
                email: "lonely@example.com".to_string(),
                password_hash: "$argon2id$stub".to_string(),
            })
            .unwrap();
        scope.commit().unwrap();

        let result = DoctorService::new(store).run_checks().unwrap();
        assert_eq!(result.checks["users_without_wallet"].status, "warning");
        assert_eq!(result.summary.warnings, 1);
        assert!(result.is_healthy());
    }
}
