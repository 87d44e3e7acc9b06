//! History service - paged, read-only view of a wallet's ledger entries

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::domain::result::{Error, Result};
use crate::domain::{HistoryCursor, LedgerEntry, WalletId};
use crate::ports::LedgerStore;

/// History query service
pub struct HistoryService {
    store: Arc<dyn LedgerStore>,
    page_size: usize,
}

impl HistoryService {
    pub fn new(store: Arc<dyn LedgerStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Every entry touching `wallet`, oldest first
    pub fn history(&self, wallet: WalletId) -> Result<HistoryPages> {
        self.open(wallet, None)
    }

    /// Continue a history from the position a previous iterator reported
    pub fn resume(&self, wallet: WalletId, cursor: HistoryCursor) -> Result<HistoryPages> {
        self.open(wallet, Some(cursor))
    }

    fn open(&self, wallet: WalletId, cursor: Option<HistoryCursor>) -> Result<HistoryPages> {
        if self.store.find_wallet(wallet)?.is_none() {
            return Err(Error::WalletNotFound(wallet));
        }
        Ok(HistoryPages {
            store: Arc::clone(&self.store),
            wallet,
            page_size: self.page_size,
            cursor,
            buffered: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Write a wallet's history as CSV, at most `limit` rows when given,
    /// returning the number of rows
    pub fn export_csv<W: Write>(
        &self,
        wallet: WalletId,
        limit: Option<usize>,
        writer: W,
    ) -> Result<usize> {
        let mut csv = csv::Writer::from_writer(writer);
        let mut rows = 0;

        for entry in self.history(wallet)?.take(limit.unwrap_or(usize::MAX)) {
            let entry = entry?;
            csv.serialize(CsvRow::new(&entry, wallet))
                .map_err(|e| Error::Export(e.to_string()))?;
            rows += 1;
        }

        csv.flush().map_err(|e| Error::Export(e.to_string()))?;
        Ok(rows)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    entry_id: i64,
    timestamp: String,
    source_wallet_id: i64,
    destination_wallet_id: i64,
    amount: String,
    net: String,
    request_id: &'a str,
}

impl<'a> CsvRow<'a> {
    fn new(entry: &'a LedgerEntry, wallet: WalletId) -> Self {
        Self {
            entry_id: entry.id.get(),
            timestamp: entry.timestamp.to_rfc3339(),
            source_wallet_id: entry.source_wallet_id.get(),
            destination_wallet_id: entry.destination_wallet_id.get(),
            amount: entry.amount.to_string(),
            net: entry.net_effect_on(wallet).to_string(),
            request_id: entry.request_id.as_deref().unwrap_or(""),
        }
    }
}

/// Lazy iterator over a wallet's history
///
/// Pages are fetched with keyset pagination on `(timestamp, id)`, so
/// entries appended while iterating are picked up if they sort after the
/// cursor and never cause duplicates. After an error the iterator ends.
pub struct HistoryPages {
    store: Arc<dyn LedgerStore>,
    wallet: WalletId,
    page_size: usize,
    cursor: Option<HistoryCursor>,
    buffered: VecDeque<LedgerEntry>,
    exhausted: bool,
}

impl HistoryPages {
    /// Position of the last entry handed out; pass to
    /// [`HistoryService::resume`] to continue from here
    pub fn cursor(&self) -> Option<HistoryCursor> {
        self.cursor
    }

    fn fetch(&mut self) -> Result<()> {
        let page = self
            .store
            .history_page(self.wallet, self.cursor.as_ref(), self.page_size)?;
        debug!(wallet = %self.wallet, fetched = page.len(), "history page");
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        self.buffered.extend(page);
        Ok(())
    }
}

impl Iterator for HistoryPages {
    type Item = Result<LedgerEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }

        let entry = self.buffered.pop_front()?;
        self.cursor = Some(entry.cursor());
        Some(Ok(entry))
    }
}
