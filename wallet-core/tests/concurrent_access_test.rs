//! Concurrent ledger access tests
//!
//! Many threads hit the same on-disk ledger through one WalletContext.
//! These tests check that concurrent transfers never lose or create money,
//! never drive a balance negative and never deadlock, whatever the order
//! in which wallets are named.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture
//! Run specific test: cargo test --test concurrent_access_test test_name -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use wallet_core::config::Config;
use wallet_core::domain::result::Error;
use wallet_core::domain::{Amount, NewUser, WalletId};
use wallet_core::ports::LedgerStore;
use wallet_core::WalletContext;

/// Number of concurrent threads for stress tests
const THREAD_COUNT: usize = 8;

/// Number of iterations per thread
const ITERATIONS_PER_THREAD: usize = 10;

/// Context with a generous lock wait so contention never surfaces as Busy
fn create_context(temp_dir: &TempDir) -> Arc<WalletContext> {
    std::fs::write(
        temp_dir.path().join("settings.json"),
        r#"{"ledger": {"lockTimeoutMs": 30000}}"#,
    )
    .unwrap();
    Arc::new(WalletContext::new(temp_dir.path()).expect("Failed to open wallet context"))
}

/// Create a wallet directly through the store, skipping password hashing
fn create_wallet(ctx: &WalletContext, name: &str, opening_cents: i64) -> WalletId {
    let mut scope = ctx.store.begin().unwrap();
    let user = scope
        .insert_user(&NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name),
            password_hash: "$argon2id$stub".to_string(),
        })
        .unwrap();
    let wallet = scope.insert_wallet(user.id).unwrap();
    scope.commit().unwrap();

    if opening_cents > 0 {
        ctx.deposit_service
            .deposit(wallet.id, Amount::from_minor(opening_cents))
            .unwrap();
    }
    wallet.id
}

fn balance(ctx: &WalletContext, id: WalletId) -> i64 {
    ctx.store.find_wallet(id).unwrap().unwrap().balance.minor()
}

/// Test: N threads each send `a` from X, which holds exactly N * a.
///
/// Every transfer must succeed, X must end at zero and Y at N * a.
#[test]
fn test_concurrent_transfers_drain_exactly() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_context(&temp_dir);
    let per_transfer = 125;
    let total = (THREAD_COUNT * ITERATIONS_PER_THREAD) as i64;
    let x = create_wallet(&ctx, "x", per_transfer * total);
    let y = create_wallet(&ctx, "y", 0);

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let success_count = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for _ in 0..THREAD_COUNT {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);
        let success_count = Arc::clone(&success_count);

        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..ITERATIONS_PER_THREAD {
                ctx.transfer_engine
                    .transfer(x, y, Amount::from_minor(per_transfer))
                    .unwrap();
                success_count.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(success_count.load(Ordering::SeqCst) as i64, total);
    assert_eq!(balance(&ctx, x), 0);
    assert_eq!(balance(&ctx, y), per_transfer * total);

    let transfers = ctx
        .history_service
        .history(y)
        .unwrap()
        .filter(|e| e.as_ref().map(|e| !e.is_deposit()).unwrap_or(true))
        .count();
    assert_eq!(transfers as i64, total);
}

/// Test: more concurrent debits than X can cover.
///
/// Exactly as many succeed as the balance allows; the rest fail with
/// InsufficientFunds and X never goes below zero.
#[test]
fn test_overdraw_attempts_never_go_negative() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_context(&temp_dir);
    let affordable = 20;
    let x = create_wallet(&ctx, "x", 100 * affordable);
    let y = create_wallet(&ctx, "y", 0);

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let success_count = Arc::new(AtomicUsize::new(0));
    let refused_count = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for _ in 0..THREAD_COUNT {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);
        let success_count = Arc::clone(&success_count);
        let refused_count = Arc::clone(&refused_count);

        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..ITERATIONS_PER_THREAD {
                match ctx.transfer_engine.transfer(x, y, Amount::from_minor(100)) {
                    Ok(_) => success_count.fetch_add(1, Ordering::SeqCst),
                    Err(Error::InsufficientFunds { .. }) => refused_count.fetch_add(1, Ordering::SeqCst),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(success_count.load(Ordering::SeqCst), affordable as usize);
    assert_eq!(
        refused_count.load(Ordering::SeqCst),
        THREAD_COUNT * ITERATIONS_PER_THREAD - affordable as usize
    );
    assert_eq!(balance(&ctx, x), 0);
    assert_eq!(balance(&ctx, y), 100 * affordable);
}

/// Test: X→Y and Y→X at the same time, repeatedly.
///
/// Locks are always taken in ascending id order, so this must complete
/// well within the lock timeout and conserve the combined balance.
#[test]
fn test_opposite_directions_do_not_deadlock() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_context(&temp_dir);
    let x = create_wallet(&ctx, "x", 10_000);
    let y = create_wallet(&ctx, "y", 10_000);

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let start = Instant::now();
    let mut handles = vec![];

    for thread_id in 0..THREAD_COUNT {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);

        handles.push(thread::spawn(move || {
            let (from, to) = if thread_id % 2 == 0 { (x, y) } else { (y, x) };
            barrier.wait();
            for _ in 0..ITERATIONS_PER_THREAD {
                ctx.transfer_engine
                    .transfer(from, to, Amount::from_minor(10))
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    println!("opposite-direction transfers finished in {:?}", start.elapsed());
    assert_eq!(balance(&ctx, x) + balance(&ctx, y), 20_000);
    // equal numbers of threads ran in each direction
    assert_eq!(balance(&ctx, x), 10_000);
    assert!(ctx.doctor_service.run_checks().unwrap().is_healthy());
}

/// Test: a ring of wallets with every thread sending to its neighbour.
///
/// Disjoint and overlapping pairs run together; the total never changes.
#[test]
fn test_ring_transfers_conserve_total() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_context(&temp_dir);
    let wallets: Vec<WalletId> = (0..THREAD_COUNT)
        .map(|i| create_wallet(&ctx, &format!("ring{}", i), 5_000))
        .collect();
    let wallets = Arc::new(wallets);

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let mut handles = vec![];

    for thread_id in 0..THREAD_COUNT {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);
        let wallets = Arc::clone(&wallets);

        handles.push(thread::spawn(move || {
            let from = wallets[thread_id];
            let to = wallets[(thread_id + 1) % wallets.len()];
            barrier.wait();
            for i in 0..ITERATIONS_PER_THREAD {
                ctx.transfer_engine
                    .transfer(from, to, Amount::from_minor(1 + i as i64))
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let total: i64 = wallets.iter().map(|id| balance(&ctx, *id)).sum();
    assert_eq!(total, 5_000 * THREAD_COUNT as i64);
    assert!(ctx.status_service.get_status().unwrap().is_conserved());
    assert!(ctx.doctor_service.run_checks().unwrap().is_healthy());
}

/// Test: a held row makes a short-timeout transfer give up with Busy,
/// leaving everything untouched; once released the same call succeeds.
#[test]
fn test_bounded_wait_returns_busy() {
    let config = Config {
        lock_timeout: Duration::from_millis(50),
        ..Config::default()
    };
    let ctx = Arc::new(WalletContext::in_memory(config).unwrap());
    let x = create_wallet(&ctx, "x", 1_000);
    let y = create_wallet(&ctx, "y", 0);

    let held = ctx.store.row_locks().acquire(&[y], Duration::from_secs(1)).unwrap();

    let worker = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || ctx.transfer_engine.transfer(x, y, Amount::from_minor(100)))
    };
    let err = worker.join().unwrap().unwrap_err();
    assert!(matches!(err, Error::Busy { wallet_id, .. } if wallet_id == y));
    assert!(err.is_retryable());
    assert!(!ctx.store.row_locks().is_locked(x));
    assert_eq!(balance(&ctx, x), 1_000);

    drop(held);
    ctx.transfer_engine.transfer(x, y, Amount::from_minor(100)).unwrap();
    assert_eq!(balance(&ctx, y), 100);
}

/// Test: concurrent deposits into one wallet are all applied.
#[test]
fn test_concurrent_deposits() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_context(&temp_dir);
    let z = create_wallet(&ctx, "z", 0);

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let mut handles = vec![];

    for _ in 0..THREAD_COUNT {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..ITERATIONS_PER_THREAD {
                ctx.deposit_service.deposit(z, Amount::from_minor(7)).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(balance(&ctx, z), 7 * (THREAD_COUNT * ITERATIONS_PER_THREAD) as i64);
}

/// Test: several threads register the same email at once.
///
/// One registration wins; every other one is a non-retryable
/// DuplicateEmail, whether it lost at the lookup, the insert or the commit.
#[test]
fn test_concurrent_registration_same_email() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = create_context(&temp_dir);

    let barrier = Arc::new(Barrier::new(4));
    let mut handles = vec![];

    for _ in 0..4 {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            ctx.registration_service
                .register("A", "same@example.com", "password123")
        }));
    }

    let mut registered = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => registered += 1,
            Err(e) => {
                assert!(matches!(e, Error::DuplicateEmail(ref email) if email == "same@example.com"), "unexpected error: {e}");
                assert!(!e.is_retryable());
            }
        }
    }

    assert_eq!(registered, 1);
    let status = ctx.status_service.get_status().unwrap();
    assert_eq!(status.total_users, 1);
    assert_eq!(status.total_wallets, 1);
}
