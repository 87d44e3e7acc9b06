//! Wallet Core - ledger engine for user wallets
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Wallet, LedgerEntry, Amount, Claims)
//! - **ports**: Trait definitions for the account and ledger store
//! - **services**: Transfers, deposits, history, registration and maintenance
//! - **adapters**: Concrete implementations (DuckDB, row lock table)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};

use adapters::duckdb::DuckDbStore;
use config::Config;
use ports::LedgerStore;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{Amount, Claims, HistoryCursor, LedgerEntry, User, UserId, Wallet, WalletId};
pub use services::{EntryPoint, LogEvent, LoggingService};

/// Name of the ledger database file inside the data directory
pub const DB_FILENAME: &str = "wallet.duckdb";

/// Current time at the precision the store keeps
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Main context for wallet operations
///
/// Holds the store, configuration and every service built on top of it.
pub struct WalletContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub transfer_engine: TransferEngine,
    pub deposit_service: DepositService,
    pub history_service: HistoryService,
    pub registration_service: RegistrationService,
    pub status_service: StatusService,
    pub doctor_service: DoctorService,
}

impl WalletContext {
    /// Open the ledger in `data_dir`, creating and migrating it if needed
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let config = Config::load(data_dir)?;

        let store = Arc::new(DuckDbStore::new(&data_dir.join(DB_FILENAME))?);
        store.run_migrations()?;

        Ok(Self::with_store(config, store))
    }

    /// Context over a private in-memory ledger
    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(DuckDbStore::open_in_memory()?);
        Ok(Self::with_store(config, store))
    }

    fn with_store(config: Config, store: Arc<DuckDbStore>) -> Self {
        let ledger: Arc<dyn LedgerStore> = store.clone();

        Self {
            transfer_engine: TransferEngine::new(Arc::clone(&ledger), config.lock_timeout),
            deposit_service: DepositService::new(Arc::clone(&ledger), config.lock_timeout),
            history_service: HistoryService::new(Arc::clone(&ledger), config.history_page_size),
            registration_service: RegistrationService::new(ledger, config.claims_ttl),
            status_service: StatusService::new(Arc::clone(&store)),
            doctor_service: DoctorService::new(Arc::clone(&store)),
            config,
            store,
        }
    }
}
