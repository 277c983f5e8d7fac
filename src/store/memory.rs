// =============================================================================
// In-memory history store
// =============================================================================
//
// Same semantics as the SQLite store, backed by ordered maps. Used for dry
// runs (`database_url = "memory"`) and by the orchestrator tests.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;

use super::HistoryStore;
use crate::types::Bar;

#[derive(Default)]
pub struct MemoryStore {
    bars: RwLock<BTreeMap<(String, NaiveDate), Bar>>,
    attempts: RwLock<BTreeSet<(String, NaiveDate)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored bar for `symbol`, oldest first.
    pub fn bars_for(&self, symbol: &str) -> Vec<Bar> {
        self.bars
            .read()
            .range(range_of(symbol))
            .map(|(_, bar)| bar.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.read().is_empty()
    }
}

fn range_of(symbol: &str) -> std::ops::RangeInclusive<(String, NaiveDate)> {
    (symbol.to_string(), NaiveDate::MIN)..=(symbol.to_string(), NaiveDate::MAX)
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn upsert_many(&self, bars: &[Bar]) -> Result<u64> {
        let mut map = self.bars.write();
        for bar in bars {
            map.insert((bar.symbol.clone(), bar.trade_date), bar.clone());
        }
        Ok(bars.len() as u64)
    }

    async fn latest_trade_date(&self, symbol: &str) -> Result<Option<NaiveDate>> {
        Ok(self
            .bars
            .read()
            .range(range_of(symbol))
            .next_back()
            .map(|((_, date), _)| *date))
    }

    async fn bars_before(&self, symbol: &str, before: NaiveDate, limit: usize) -> Result<Vec<Bar>> {
        let start = (symbol.to_string(), NaiveDate::MIN);
        let end = (symbol.to_string(), before);
        Ok(self
            .bars
            .read()
            .range(start..end)
            .rev()
            .take(limit)
            .map(|(_, bar)| bar.clone())
            .collect())
    }

    async fn has_attempt(&self, symbol: &str, date: NaiveDate) -> Result<bool> {
        Ok(self.attempts.read().contains(&(symbol.to_string(), date)))
    }

    async fn record_attempt(&self, symbol: &str, date: NaiveDate) -> Result<()> {
        self.attempts.write().insert((symbol.to_string(), date));
        Ok(())
    }
}
