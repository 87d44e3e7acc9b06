//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod amount;
mod claims;
mod ledger;
pub mod result;
mod user;
mod wallet;

pub use amount::{Amount, MINOR_UNIT_SCALE};
pub use claims::Claims;
pub use ledger::{HistoryCursor, LedgerEntry, LedgerEntryId, NewLedgerEntry};
pub use user::{NewUser, User, UserId, MIN_PASSWORD_LEN};
pub use wallet::{Wallet, WalletId};
