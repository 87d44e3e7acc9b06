//! In-process exclusive row locks for wallet rows
//!
//! DuckDB has no `SELECT ... FOR UPDATE`, so the store keeps its own lock
//! table. Every writer goes through [`RowLocks::acquire`], which always
//! takes rows in ascending id order; two scopes can therefore never wait on
//! each other in a cycle.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::domain::WalletId;

/// Table of currently held wallet row locks
#[derive(Debug, Default)]
pub struct RowLocks {
    held: Mutex<HashSet<WalletId>>,
    released: Condvar,
}

/// Locks held by one scope; released on drop
#[derive(Debug)]
pub struct RowLockGuard<'a> {
    table: &'a RowLocks,
    ids: Vec<WalletId>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    // Every update is a single insert or remove, so the set stays valid
    // even if a holder panicked.
    fn lock_table(&self) -> MutexGuard<'_, HashSet<WalletId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire exclusive locks on `ids`, in ascending order
    ///
    /// Duplicates are ignored. If the total wait exceeds `wait`, every lock
    /// taken so far is released and `Busy` is returned for the row that
    /// could not be taken.
    pub fn acquire(&self, ids: &[WalletId], wait: Duration) -> Result<RowLockGuard<'_>> {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let started = Instant::now();
        let deadline = started + wait;
        let mut held = self.lock_table();
        let mut acquired = Vec::with_capacity(ordered.len());

        for id in ordered {
            while held.contains(&id) {
                let now = Instant::now();
                if now >= deadline {
                    for taken in &acquired {
                        held.remove(taken);
                    }
                    drop(held);
                    self.released.notify_all();
                    warn!(wallet_id = %id, waited_ms = wait.as_millis() as u64, "row lock wait timed out");
                    return Err(Error::Busy { wallet_id: id, waited: wait });
                }
                let (guard, _) = self
                    .released
                    .wait_timeout(held, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                held = guard;
            }
            held.insert(id);
            acquired.push(id);
        }
        drop(held);

        debug!(wallets = ?acquired, elapsed_us = started.elapsed().as_micros() as u64, "row locks acquired");
        Ok(RowLockGuard {
            table: self,
            ids: acquired,
        })
    }

    /// Whether a row is currently locked by anyone
    pub fn is_locked(&self, id: WalletId) -> bool {
        self.lock_table().contains(&id)
    }
}

impl RowLockGuard<'_> {
    /// Whether this guard holds the lock for `id`
    pub fn holds(&self, id: WalletId) -> bool {
        self.ids.contains(&id)
    }

    /// Locked ids in acquisition order
    pub fn ids(&self) -> &[WalletId] {
        &self.ids
    }
}

impl Drop for RowLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.table.lock_table();
        for id in &self.ids {
            held.remove(id);
        }
        drop(held);
        self.table.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn ids(raw: &[i64]) -> Vec<WalletId> {
        raw.iter().copied().map(WalletId::new).collect()
    }

    #[test]
    fn test_acquires_in_ascending_order_without_duplicates() {
        let locks = RowLocks::new();
        let guard = locks
            .acquire(&ids(&[9, 3, 9, 5]), Duration::from_millis(10))
            .unwrap();
        assert_eq!(guard.ids(), ids(&[3, 5, 9]).as_slice());
        assert!(guard.holds(WalletId::new(5)));
        assert!(!guard.holds(WalletId::new(4)));
    }

    #[test]
    fn test_release_on_drop() {
        let locks = RowLocks::new();
        {
            let _guard = locks.acquire(&ids(&[1, 2]), Duration::from_millis(10)).unwrap();
            assert!(locks.is_locked(WalletId::new(1)));
        }
        assert!(!locks.is_locked(WalletId::new(1)));
        assert!(!locks.is_locked(WalletId::new(2)));
    }

    #[test]
    fn test_timeout_reports_busy_and_releases_partial_locks() {
        let locks = RowLocks::new();
        let _held = locks.acquire(&ids(&[2]), Duration::from_millis(10)).unwrap();

        let err = locks
            .acquire(&ids(&[1, 2]), Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, Error::Busy { wallet_id, .. } if wallet_id == WalletId::new(2)));
        // row 1 was taken first and must have been given back
        assert!(!locks.is_locked(WalletId::new(1)));
    }

    #[test]
    fn test_waiter_proceeds_after_release() {
        let locks = Arc::new(RowLocks::new());
        let barrier = Arc::new(Barrier::new(2));

        let holder = {
            let locks = Arc::clone(&locks);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let _guard = locks.acquire(&ids(&[1]), Duration::from_secs(1)).unwrap();
                barrier.wait();
                thread::sleep(Duration::from_millis(50));
            })
        };

        barrier.wait();
        let guard = locks.acquire(&ids(&[1]), Duration::from_secs(5));
        assert!(guard.is_ok());
        holder.join().unwrap();
    }

    #[test]
    fn test_opposite_orders_do_not_deadlock() {
        let locks = Arc::new(RowLocks::new());
        let mut handles = vec![];

        for i in 0..8 {
            let locks = Arc::clone(&locks);
            handles.push(thread::spawn(move || {
                let pair = if i % 2 == 0 { ids(&[1, 2]) } else { ids(&[2, 1]) };
                for _ in 0..50 {
                    let _guard = locks.acquire(&pair, Duration::from_secs(5)).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!locks.is_locked(WalletId::new(1)));
        assert!(!locks.is_locked(WalletId::new(2)));
    }

    /// Subscriber counting events emitted while the lock table mutex is held
    struct TableCheck {
        locks: Arc<RowLocks>,
        events: Arc<AtomicUsize>,
        while_held: Arc<AtomicUsize>,
    }

    impl tracing::Subscriber for TableCheck {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }

        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

        fn event(&self, _: &tracing::Event<'_>) {
            self.events.fetch_add(1, Ordering::SeqCst);
            if self.locks.held.try_lock().is_err() {
                self.while_held.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn enter(&self, _: &tracing::span::Id) {}

        fn exit(&self, _: &tracing::span::Id) {}
    }

    #[test]
    fn test_logging_happens_outside_the_table_mutex() {
        let locks = Arc::new(RowLocks::new());
        let events = Arc::new(AtomicUsize::new(0));
        let while_held = Arc::new(AtomicUsize::new(0));
        let check = TableCheck {
            locks: Arc::clone(&locks),
            events: Arc::clone(&events),
            while_held: Arc::clone(&while_held),
        };

        tracing::subscriber::with_default(check, || {
            let guard = locks.acquire(&ids(&[1, 2]), Duration::from_millis(10)).unwrap();
            assert!(matches!(
                locks.acquire(&ids(&[2]), Duration::from_millis(10)),
                Err(Error::Busy { .. })
            ));
            drop(guard);
        });

        assert!(events.load(Ordering::SeqCst) > 0);
        assert_eq!(while_held.load(Ordering::SeqCst), 0);
    }
}
