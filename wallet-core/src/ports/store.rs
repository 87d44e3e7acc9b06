//! Store port - account and ledger storage abstraction

use std::time::Duration;

use crate::domain::result::Result;
use crate::domain::{
    Amount, HistoryCursor, LedgerEntry, NewLedgerEntry, NewUser, User, UserId, Wallet, WalletId,
};

/// Account store and ledger entry store
///
/// Reads on this trait take no row locks and see the latest committed
/// state. Every mutation goes through a [`StoreScope`] opened with
/// [`LedgerStore::begin`].
pub trait LedgerStore: Send + Sync {
    /// Open a transactional scope
    fn begin(&self) -> Result<Box<dyn StoreScope + '_>>;

    /// Get wallet by ID
    fn find_wallet(&self, id: WalletId) -> Result<Option<Wallet>>;

    /// Get the wallet owned by a user
    fn find_wallet_by_owner(&self, owner_id: UserId) -> Result<Option<Wallet>>;

    /// Get user by ID
    fn find_user(&self, id: UserId) -> Result<Option<User>>;

    /// Get user by (normalized) email
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// One page of a wallet's history, strictly after `after`, ordered by
    /// `(timestamp, id)` ascending
    fn history_page(
        &self,
        wallet_id: WalletId,
        after: Option<&HistoryCursor>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>>;
}

/// A unit of work against the store
///
/// Row locks must be taken before anything else is read or written, so the
/// scope's snapshot starts after every previous holder of those rows has
/// committed. Dropping a scope without calling [`StoreScope::commit`] rolls
/// it back and releases its locks.
pub trait StoreScope {
    /// Lock the given wallet rows and read them
    ///
    /// Locks are taken in ascending id order whatever the order of `ids`.
    /// Waiting longer than `wait` in total fails with `Busy`.
    /// Wallets that do not exist are absent from the returned list, which is
    /// sorted by id.
    fn lock_wallets(&mut self, ids: &[WalletId], wait: Duration) -> Result<Vec<Wallet>>;

    /// Overwrite a locked wallet's balance
    fn set_balance(&mut self, id: WalletId, balance: Amount) -> Result<()>;

    /// Append a ledger entry
    fn append_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry>;

    /// Look up an entry by its caller-supplied request identifier
    fn find_entry_by_request_id(&mut self, request_id: &str) -> Result<Option<LedgerEntry>>;

    /// Insert a user row
    fn insert_user(&mut self, user: &NewUser) -> Result<User>;

    /// Insert a zero-balance wallet for a user
    fn insert_wallet(&mut self, owner_id: UserId) -> Result<Wallet>;

    /// Commit every change made through this scope
    fn commit(self: Box<Self>) -> Result<()>;
}
