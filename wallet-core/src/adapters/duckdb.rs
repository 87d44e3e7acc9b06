//! DuckDB store implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection, Row};
use serde::Serialize;
use tracing::{debug, warn};

use crate::adapters::row_locks::{RowLockGuard, RowLocks};
use crate::domain::result::{Error, Result};
use crate::domain::{
    Amount, HistoryCursor, LedgerEntry, LedgerEntryId, NewLedgerEntry, NewUser, User, UserId,
    Wallet, WalletId,
};
use crate::migrations::MIGRATIONS;
use crate::ports::{LedgerStore, StoreScope};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Bind format for TIMESTAMP columns, microsecond precision
const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// DuckDB renders TIMESTAMP as VARCHAR with a variable-width fraction
const DB_TIMESTAMP_PARSE: &str = "%Y-%m-%d %H:%M:%S%.f";

const ENTRY_COLUMNS: &str = "entry_id, source_wallet_id, destination_wallet_id, amount, request_id, CAST(committed_at AS VARCHAR)";
const WALLET_COLUMNS: &str = "wallet_id, owner_user_id, balance, CAST(created_at AS VARCHAR)";
const USER_COLUMNS: &str = "user_id, name, email, password_hash, CAST(created_at AS VARCHAR)";

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock on file")
        || lower.contains("file is already open")
}

fn is_unique_violation(err: &duckdb::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("duplicate key") || msg.contains("unique constraint")
}

fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(DB_TIMESTAMP_FORMAT).to_string()
}

fn parse_db_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, DB_TIMESTAMP_PARSE)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::persistence(format!("invalid stored timestamp '{}': {}", raw, e)))
}

struct EntryRow {
    id: i64,
    source: i64,
    destination: i64,
    amount: i64,
    request_id: Option<String>,
    committed_at: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source: row.get(1)?,
            destination: row.get(2)?,
            amount: row.get(3)?,
            request_id: row.get(4)?,
            committed_at: row.get(5)?,
        })
    }

    fn into_entry(self) -> Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: LedgerEntryId::new(self.id),
            source_wallet_id: WalletId::new(self.source),
            destination_wallet_id: WalletId::new(self.destination),
            amount: Amount::from_minor(self.amount),
            request_id: self.request_id,
            timestamp: parse_db_timestamp(&self.committed_at)?,
        })
    }
}

struct WalletRow {
    id: i64,
    owner: i64,
    balance: i64,
    created_at: String,
}

impl WalletRow {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner: row.get(1)?,
            balance: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_wallet(self) -> Result<Wallet> {
        Ok(Wallet {
            id: WalletId::new(self.id),
            owner_id: UserId::new(self.owner),
            balance: Amount::from_minor(self.balance),
            created_at: parse_db_timestamp(&self.created_at)?,
        })
    }
}

struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_user(self) -> Result<User> {
        Ok(User {
            id: UserId::new(self.id),
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            created_at: parse_db_timestamp(&self.created_at)?,
        })
    }
}

fn select_wallet(conn: &Connection, id: WalletId) -> Result<Option<Wallet>> {
    let sql = format!("SELECT {} FROM wallets WHERE wallet_id = ?", WALLET_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_map([id.get()], WalletRow::from_row)?.next().transpose()?;
    row.map(WalletRow::into_wallet).transpose()
}

fn select_wallet_by_owner(conn: &Connection, owner_id: UserId) -> Result<Option<Wallet>> {
    let sql = format!("SELECT {} FROM wallets WHERE owner_user_id = ?", WALLET_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_map([owner_id.get()], WalletRow::from_row)?.next().transpose()?;
    row.map(WalletRow::into_wallet).transpose()
}

fn select_user<P: duckdb::Params>(conn: &Connection, column: &str, key: P) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_map(key, UserRow::from_row)?.next().transpose()?;
    row.map(UserRow::into_user).transpose()
}

fn select_entry_by_request_id(conn: &Connection, request_id: &str) -> Result<Option<LedgerEntry>> {
    let sql = format!("SELECT {} FROM ledger_entries WHERE request_id = ?", ENTRY_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_map([request_id], EntryRow::from_row)?.next().transpose()?;
    row.map(EntryRow::into_entry).transpose()
}

fn next_id(conn: &Connection, sequence: &str) -> Result<i64> {
    let id = conn.query_row(&format!("SELECT nextval('{}')", sequence), [], |row| row.get(0))?;
    Ok(id)
}

/// A wallet whose stored balance disagrees with its ledger entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unreconciled {
    pub wallet_id: WalletId,
    pub balance: Amount,
    pub ledger_net: Amount,
}

/// Row counts and money totals across the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreTotals {
    pub users: i64,
    pub wallets: i64,
    pub ledger_entries: i64,
    pub total_balance: Amount,
    pub total_deposited: Amount,
}

/// DuckDB-backed account and ledger store
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    locks: RowLocks,
}

impl DuckDbStore {
    /// Open (or create) the ledger database at `db_path`
    ///
    /// Retries with exponential backoff while another process holds the
    /// file. Does not migrate; call [`DuckDbStore::run_migrations`].
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                        locks: RowLocks::new(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    attempt += 1;
                    if !is_retryable_error(&err_msg) || attempt >= MAX_RETRIES {
                        return Err(e);
                    }
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt - 1));
                    warn!(
                        attempt,
                        max = MAX_RETRIES,
                        delay_ms = delay.as_millis() as u64,
                        error = %err_msg,
                        "database busy, retrying"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }

    /// Open a private in-memory database, already migrated
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
            locks: RowLocks::new(),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Run ledger schema migrations
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.root()?;
        MigrationService::new(&conn, MIGRATIONS).run_pending()
    }

    /// Path of the database file, `None` when in memory
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// The lock table shared by every scope of this store
    pub fn row_locks(&self) -> &RowLocks {
        &self.locks
    }

    fn root(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::persistence(format!("connection lock poisoned: {}", e)))
    }

    /// Row counts and money totals
    pub fn totals(&self) -> Result<StoreTotals> {
        let conn = self.root()?;
        let totals = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM wallets),
                (SELECT COUNT(*) FROM ledger_entries),
                (SELECT CAST(COALESCE(SUM(balance), 0) AS BIGINT) FROM wallets),
                (SELECT CAST(COALESCE(SUM(amount), 0) AS BIGINT) FROM ledger_entries
                    WHERE source_wallet_id = 0)",
            [],
            |row| {
                Ok(StoreTotals {
                    users: row.get(0)?,
                    wallets: row.get(1)?,
                    ledger_entries: row.get(2)?,
                    total_balance: Amount::from_minor(row.get(3)?),
                    total_deposited: Amount::from_minor(row.get(4)?),
                })
            },
        )?;
        Ok(totals)
    }

    /// Wallets holding a negative balance
    pub fn negative_balances(&self) -> Result<Vec<(WalletId, Amount)>> {
        let conn = self.root()?;
        let mut stmt = conn.prepare(
            "SELECT wallet_id, balance FROM wallets WHERE balance < 0 ORDER BY wallet_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    WalletId::new(row.get(0)?),
                    Amount::from_minor(row.get(1)?),
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Wallets whose balance differs from credits minus debits in the ledger
    pub fn unreconciled_wallets(&self) -> Result<Vec<Unreconciled>> {
        let conn = self.root()?;
        let mut stmt = conn.prepare(
            "WITH credits AS (
                SELECT destination_wallet_id AS wallet_id, SUM(amount) AS total
                FROM ledger_entries GROUP BY destination_wallet_id
            ), debits AS (
                SELECT source_wallet_id AS wallet_id, SUM(amount) AS total
                FROM ledger_entries GROUP BY source_wallet_id
            ), net AS (
                SELECT w.wallet_id, w.balance,
                       CAST(COALESCE(c.total, 0) - COALESCE(d.total, 0) AS BIGINT) AS ledger_net
                FROM wallets w
                LEFT JOIN credits c ON c.wallet_id = w.wallet_id
                LEFT JOIN debits d ON d.wallet_id = w.wallet_id
            )
            SELECT wallet_id, balance, ledger_net FROM net
            WHERE balance <> ledger_net
            ORDER BY wallet_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Unreconciled {
                    wallet_id: WalletId::new(row.get(0)?),
                    balance: Amount::from_minor(row.get(1)?),
                    ledger_net: Amount::from_minor(row.get(2)?),
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Users that have no wallet
    pub fn users_without_wallet(&self) -> Result<Vec<UserId>> {
        let conn = self.root()?;
        let mut stmt = conn.prepare(
            "SELECT u.user_id FROM users u
             LEFT JOIN wallets w ON w.owner_user_id = u.user_id
             WHERE w.wallet_id IS NULL
             ORDER BY u.user_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok(UserId::new(row.get(0)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Ledger entries naming a wallet that does not exist
    pub fn dangling_entries(&self) -> Result<Vec<LedgerEntryId>> {
        let conn = self.root()?;
        let mut stmt = conn.prepare(
            "SELECT e.entry_id FROM ledger_entries e
             WHERE e.destination_wallet_id NOT IN (SELECT wallet_id FROM wallets)
                OR (e.source_wallet_id <> 0
                    AND e.source_wallet_id NOT IN (SELECT wallet_id FROM wallets))
             ORDER BY e.entry_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok(LedgerEntryId::new(row.get(0)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl LedgerStore for DuckDbStore {
    fn begin(&self) -> Result<Box<dyn StoreScope + '_>> {
        let conn = self.root()?.try_clone()?;
        Ok(Box::new(DuckDbScope {
            conn,
            locks: &self.locks,
            guard: None,
            in_transaction: false,
            committed: false,
            inserted_email: None,
            request_id: None,
        }))
    }

    fn find_wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let conn = self.root()?;
        select_wallet(&conn, id)
    }

    fn find_wallet_by_owner(&self, owner_id: UserId) -> Result<Option<Wallet>> {
        let conn = self.root()?;
        select_wallet_by_owner(&conn, owner_id)
    }

    fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let conn = self.root()?;
        select_user(&conn, "user_id", [id.get()])
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.root()?;
        select_user(&conn, "email", [email])
    }

    fn history_page(
        &self,
        wallet_id: WalletId,
        after: Option<&HistoryCursor>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let conn = self.root()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let wallet = wallet_id.get();

        let rows = match after {
            None => {
                let sql = format!(
                    "SELECT {} FROM ledger_entries
                     WHERE source_wallet_id = ? OR destination_wallet_id = ?
                     ORDER BY committed_at, entry_id
                     LIMIT ?",
                    ENTRY_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![wallet, wallet, limit], EntryRow::from_row)?
                    .collect::<duckdb::Result<Vec<_>>>()?;
                rows
            }
            Some(cursor) => {
                let ts = to_db_timestamp(&cursor.timestamp);
                let sql = format!(
                    "SELECT {} FROM ledger_entries
                     WHERE (source_wallet_id = ? OR destination_wallet_id = ?)
                       AND (committed_at > CAST(? AS TIMESTAMP)
                            OR (committed_at = CAST(? AS TIMESTAMP) AND entry_id > ?))
                     ORDER BY committed_at, entry_id
                     LIMIT ?",
                    ENTRY_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        params![wallet, wallet, ts, ts, cursor.entry_id.get(), limit],
                        EntryRow::from_row,
                    )?
                    .collect::<duckdb::Result<Vec<_>>>()?;
                rows
            }
        };

        rows.into_iter().map(EntryRow::into_entry).collect()
    }
}

/// One transaction on a private connection, plus the row locks it holds
///
/// Field order matters: the connection is closed before the guard releases
/// its locks.
pub struct DuckDbScope<'a> {
    conn: Connection,
    locks: &'a RowLocks,
    guard: Option<RowLockGuard<'a>>,
    in_transaction: bool,
    committed: bool,
    // keys a unique index may still reject at COMMIT
    inserted_email: Option<String>,
    request_id: Option<String>,
}

impl DuckDbScope<'_> {
    fn ensure_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN TRANSACTION")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Concurrent scopes inserting the same unique key conflict at COMMIT
    /// rather than at INSERT; report those like an insert-time violation
    fn commit_error(&self, err: duckdb::Error) -> Error {
        if !is_unique_violation(&err) {
            return err.into();
        }
        let msg = err.to_string();
        match (&self.inserted_email, &self.request_id) {
            (Some(email), _) if msg.contains(email.as_str()) => Error::DuplicateEmail(email.clone()),
            (_, Some(request_id)) if msg.contains(request_id.as_str()) => {
                Error::validation(format!("request id '{}' was already used", request_id))
            }
            (Some(email), None) => Error::DuplicateEmail(email.clone()),
            _ => err.into(),
        }
    }

    fn ensure_locked(&self, id: WalletId) -> Result<()> {
        match &self.guard {
            Some(guard) if guard.holds(id) => Ok(()),
            _ => Err(Error::persistence(format!(
                "wallet {} is not locked by this scope",
                id
            ))),
        }
    }
}

impl StoreScope for DuckDbScope<'_> {
    fn lock_wallets(&mut self, ids: &[WalletId], wait: Duration) -> Result<Vec<Wallet>> {
        if self.guard.is_some() || self.in_transaction {
            return Err(Error::persistence(
                "row locks must be taken once, before the scope touches any data",
            ));
        }

        let guard = self.locks.acquire(ids, wait)?;
        let locked = guard.ids().to_vec();
        self.guard = Some(guard);
        self.ensure_transaction()?;

        let mut wallets = Vec::with_capacity(locked.len());
        for id in locked {
            if let Some(wallet) = select_wallet(&self.conn, id)? {
                wallets.push(wallet);
            }
        }
        Ok(wallets)
    }

    fn set_balance(&mut self, id: WalletId, balance: Amount) -> Result<()> {
        self.ensure_locked(id)?;
        self.ensure_transaction()?;
        let updated = self.conn.execute(
            "UPDATE wallets SET balance = ? WHERE wallet_id = ?",
            params![balance.minor(), id.get()],
        )?;
        if updated == 0 {
            return Err(Error::WalletNotFound(id));
        }
        Ok(())
    }

    fn append_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        self.ensure_transaction()?;
        let id = next_id(&self.conn, "ledger_entry_id_seq")?;
        let inserted = self.conn.execute(
            "INSERT INTO ledger_entries
                (entry_id, source_wallet_id, destination_wallet_id, amount, request_id, committed_at)
             VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                id,
                entry.source_wallet_id.get(),
                entry.destination_wallet_id.get(),
                entry.amount.minor(),
                entry.request_id.as_deref(),
                to_db_timestamp(&entry.timestamp),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if entry.request_id.is_some() && is_unique_violation(&e) => {
                return Err(Error::validation(format!(
                    "request id '{}' was already used",
                    entry.request_id.as_deref().unwrap_or_default()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        if entry.request_id.is_some() {
            self.request_id = entry.request_id.clone();
        }

        Ok(LedgerEntry {
            id: LedgerEntryId::new(id),
            source_wallet_id: entry.source_wallet_id,
            destination_wallet_id: entry.destination_wallet_id,
            amount: entry.amount,
            request_id: entry.request_id.clone(),
            timestamp: entry.timestamp,
        })
    }

    fn find_entry_by_request_id(&mut self, request_id: &str) -> Result<Option<LedgerEntry>> {
        self.ensure_transaction()?;
        select_entry_by_request_id(&self.conn, request_id)
    }

    fn insert_user(&mut self, user: &NewUser) -> Result<User> {
        self.ensure_transaction()?;
        let id = next_id(&self.conn, "user_id_seq")?;
        let created_at = crate::now();
        let inserted = self.conn.execute(
            "INSERT INTO users (user_id, name, email, password_hash, created_at)
             VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                id,
                &user.name,
                &user.email,
                &user.password_hash,
                to_db_timestamp(&created_at),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(Error::DuplicateEmail(user.email.clone())),
            Err(e) => return Err(e.into()),
        }
        self.inserted_email = Some(user.email.clone());

        Ok(User {
            id: UserId::new(id),
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at,
        })
    }

    fn insert_wallet(&mut self, owner_id: UserId) -> Result<Wallet> {
        self.ensure_transaction()?;
        let id = next_id(&self.conn, "wallet_id_seq")?;
        let created_at = crate::now();
        self.conn.execute(
            "INSERT INTO wallets (wallet_id, owner_user_id, balance, created_at)
             VALUES (?, ?, 0, CAST(? AS TIMESTAMP))",
            params![id, owner_id.get(), to_db_timestamp(&created_at)],
        )?;

        Ok(Wallet {
            id: WalletId::new(id),
            owner_id,
            balance: Amount::ZERO,
            created_at,
        })
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        if self.in_transaction {
            if let Err(e) = self.conn.execute_batch("COMMIT") {
                return Err(self.commit_error(e));
            }
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for DuckDbScope<'_> {
    fn drop(&mut self) {
        if self.in_transaction && !self.committed {
            // A failed COMMIT has usually ended the transaction already
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                debug!(error = %e, "rollback skipped");
            }
        }
    }
}
