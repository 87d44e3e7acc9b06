//! Ledger entry domain model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use super::wallet::WalletId;

/// Ledger entry identifier, monotonically increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerEntryId(i64);

impl LedgerEntryId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable record of one completed balance movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub source_wallet_id: WalletId,
    pub destination_wallet_id: WalletId,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// True when money entered from outside the system
    pub fn is_deposit(&self) -> bool {
        self.source_wallet_id.is_external()
    }

    /// Signed effect of this entry on the given wallet's balance
    pub fn net_effect_on(&self, wallet_id: WalletId) -> Amount {
        if self.destination_wallet_id == wallet_id {
            self.amount
        } else if self.source_wallet_id == wallet_id {
            Amount::from_minor(-self.amount.minor())
        } else {
            Amount::ZERO
        }
    }

    /// Position of this entry in history order
    pub fn cursor(&self) -> HistoryCursor {
        HistoryCursor {
            timestamp: self.timestamp,
            entry_id: self.id,
        }
    }

    /// Whether this entry records the same movement as the given request
    pub fn matches(&self, source: WalletId, destination: WalletId, amount: Amount) -> bool {
        self.source_wallet_id == source
            && self.destination_wallet_id == destination
            && self.amount == amount
    }
}

/// An entry about to be appended; id and timestamp are assigned by the store
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub source_wallet_id: WalletId,
    pub destination_wallet_id: WalletId,
    pub amount: Amount,
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Keyset position in a wallet's history: `(timestamp, entry_id)` of the
/// last entry already seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCursor {
    pub timestamp: DateTime<Utc>,
    pub entry_id: LedgerEntryId,
}
