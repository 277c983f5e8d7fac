// =============================================================================
// Persistence: enriched bar history and the attempt log
// =============================================================================
//
// `(symbol, trade_date)` is the idempotency key. `upsert_many` overwrites
// every non-key column on conflict, so replaying the same batch leaves the
// table unchanged.
//
// The sync cursor is never cached here: `latest_trade_date` reads it from the
// stored rows on every call.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::Bar;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert or overwrite `bars` in a single transaction. Returns the number
    /// of rows written.
    async fn upsert_many(&self, bars: &[Bar]) -> Result<u64>;

    /// Newest persisted trade date for `symbol`.
    async fn latest_trade_date(&self, symbol: &str) -> Result<Option<NaiveDate>>;

    /// Up to `limit` persisted bars strictly before `before`, newest first.
    async fn bars_before(&self, symbol: &str, before: NaiveDate, limit: usize) -> Result<Vec<Bar>>;

    /// Newest persisted bar strictly before `before`.
    async fn find_previous_bar(&self, symbol: &str, before: NaiveDate) -> Result<Option<Bar>> {
        Ok(self.bars_before(symbol, before, 1).await?.into_iter().next())
    }

    /// Whether `symbol` was already attempted on calendar day `date`.
    async fn has_attempt(&self, symbol: &str, date: NaiveDate) -> Result<bool>;

    /// Record a successful attempt. Recording the same pair twice is a no-op.
    async fn record_attempt(&self, symbol: &str, date: NaiveDate) -> Result<()>;
}
