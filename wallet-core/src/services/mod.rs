//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod deposit;
mod doctor;
mod history;
pub mod logging;
pub mod migration;
mod registration;
mod status;
mod transfer;

pub use deposit::{DepositRequest, DepositService};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use history::{HistoryPages, HistoryService};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use registration::{Registration, RegistrationService, WalletDetails};
pub use status::{StatusService, StatusSummary};
pub use transfer::{TransferEngine, TransferRequest};
