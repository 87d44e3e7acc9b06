//! Wallet domain model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use super::user::UserId;

/// Wallet identifier
///
/// Real wallets are numbered from 1 by their own sequence. `0` is reserved
/// for the external world and only ever appears as a deposit's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(i64);

impl WalletId {
    /// Sentinel source for deposits (money entering from outside the system)
    pub const EXTERNAL: WalletId = WalletId(0);

    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub fn is_external(self) -> bool {
        self == Self::EXTERNAL
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_external() {
            write!(f, "external")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A wallet holding a non-negative balance, owned by exactly one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: UserId,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
}
