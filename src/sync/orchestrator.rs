// =============================================================================
// Sync Orchestrator: per-instrument incremental sync and the batch pass
// =============================================================================
//
// Per instrument (strictly sequential within a pass):
//
//   1. attempt log hit for today         -> AlreadyAttempted, no network
//   2. cursor = latest persisted date    -> Full | Incremental(cursor)
//   3. cursor == last trading day        -> UpToDate, attempt logged
//   4. size the fetch window
//   5. fetch (retried)
//   6. sort newest first
//   7. keep bars strictly after the cursor
//   8. incremental: swap the fetched overlap for persisted history before
//      the oldest new bar (up to the engine window)
//   9. enrich the new bars, oldest first
//  10. upsert + attempt log (retried)
//
// Every store call goes through the same retry policy as the fetch.
//
// The pass sleeps after each instrument that actually fetched and wrote bars,
// padding its wall time up to the pacing floor. That sleep is the cancellation
// point: a cancelled token ends the whole pass with `SyncError::Cancelled`.
// =============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::retry::{RetryError, RetryPolicy};
use crate::calendar::{fetch_window, last_trading_day};
use crate::error::{SyncError, SyncResult};
use crate::indicators::{enrich_new_bars, MAX_WINDOW};
use crate::sina::MarketDataSource;
use crate::store::HistoryStore;
use crate::symbol;
use crate::types::{Bar, SyncMode};

/// Knobs the orchestrator needs, lifted out of `RuntimeConfig`.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub max_history_bars: usize,
    pub overlap_days: i64,
    pub pace: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_history_bars: 70_000,
            overlap_days: 10,
            pace: Duration::from_millis(2_000),
            retry: RetryPolicy::default(),
        }
    }
}

/// What happened to one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Already attempted today; nothing was called.
    AlreadyAttempted,
    /// Cursor already at the last trading day; no fetch issued.
    UpToDate,
    /// Provider had no bars for the symbol.
    NoData,
    /// Fetched, but every bar was already persisted.
    NoNewBars,
    Synced { written: u64, malformed: usize },
}

impl SyncOutcome {
    pub fn written(self) -> u64 {
        match self {
            Self::Synced { written, .. } => written,
            _ => 0,
        }
    }

    /// Only instruments that wrote new bars are paced.
    fn needs_pacing(self) -> bool {
        matches!(self, Self::Synced { .. })
    }
}

/// Summary of one pass over the universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub attempted: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bars_written: u64,
}

impl PassReport {
    fn new() -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            attempted: 0,
            synced: 0,
            skipped: 0,
            failed: 0,
            bars_written: 0,
        }
    }
}

pub struct Orchestrator {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn HistoryStore>,
    settings: SyncSettings,
    cancel: CancellationToken,
    fixed_today: Option<NaiveDate>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn HistoryStore>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            settings,
            cancel,
            fixed_today: None,
        }
    }

    /// Pin the calendar date instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.fixed_today.unwrap_or_else(|| Local::now().date_naive())
    }

    // -------------------------------------------------------------------------
    // Single instrument
    // -------------------------------------------------------------------------

    /// Sync one instrument now and return the number of bars written.
    pub async fn sync_one(&self, symbol: &str) -> SyncResult<u64> {
        self.sync_instrument(symbol).await.map(SyncOutcome::written)
    }

    pub async fn sync_instrument(&self, symbol: &str) -> SyncResult<SyncOutcome> {
        let today = self.today();

        if self
            .store_op("attempt-log", symbol, || self.store.has_attempt(symbol, today))
            .await?
        {
            debug!(symbol, "already attempted today");
            return Ok(SyncOutcome::AlreadyAttempted);
        }

        let mode = SyncMode::from_cursor(
            self.store_op("cursor", symbol, || self.store.latest_trade_date(symbol))
                .await?,
        );
        let cursor = mode.cursor();

        if let Some(cursor) = cursor {
            if cursor >= last_trading_day(today) {
                debug!(symbol, %cursor, "history already current");
                self.record_attempt(symbol, today).await?;
                return Ok(SyncOutcome::UpToDate);
            }
        }

        let max_bars = fetch_window(today, cursor, self.settings.overlap_days, self.settings.max_history_bars);
        let mut batch = self
            .settings
            .retry
            .run("fetch", symbol, &self.cancel, || self.source.fetch_history(symbol, max_bars))
            .await
            .map_err(|e| retry_to_sync(e, |last| SyncError::fetch(symbol, &last)))?;

        if batch.is_empty() {
            debug!(symbol, "provider returned no data");
            self.record_attempt(symbol, today).await?;
            return Ok(SyncOutcome::NoData);
        }

        batch.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));
        batch.dedup_by_key(|b| b.trade_date);
        let fetched = batch.len();

        let new_count = match cursor {
            Some(cursor) => batch.iter().take_while(|b| b.trade_date > cursor).count(),
            None => batch.len(),
        };
        if new_count == 0 {
            debug!(symbol, %mode, "no bars newer than cursor");
            self.record_attempt(symbol, today).await?;
            return Ok(SyncOutcome::NoNewBars);
        }

        if cursor.is_some() {
            self.attach_history(symbol, &mut batch, new_count).await?;
        }

        let malformed = enrich_new_bars(&mut batch, new_count);
        let new_bars = &batch[..new_count];

        let written = self
            .store_op("persist", symbol, || async move {
                let written = self.store.upsert_many(new_bars).await?;
                self.store.record_attempt(symbol, today).await?;
                Ok(written)
            })
            .await?;

        info!(
            symbol,
            %mode,
            fetched,
            history = batch.len() - new_count,
            written,
            malformed,
            newest = %new_bars[0].trade_date,
            "instrument synced"
        );
        Ok(SyncOutcome::Synced { written, malformed })
    }

    /// Replace everything behind the new bars with persisted, already
    /// enriched history, so each new bar sees a full window and the derived
    /// values of its predecessors regardless of how few bars were fetched.
    async fn attach_history(&self, symbol: &str, batch: &mut Vec<Bar>, new_count: usize) -> SyncResult<()> {
        let oldest_new = batch[new_count - 1].trade_date;
        let history = self
            .store_op("history", symbol, || {
                self.store.bars_before(symbol, oldest_new, MAX_WINDOW - 1)
            })
            .await?;

        batch.truncate(new_count);
        batch.extend(history);
        Ok(())
    }

    async fn record_attempt(&self, symbol: &str, today: NaiveDate) -> SyncResult<()> {
        self.store_op("attempt-log", symbol, || self.store.record_attempt(symbol, today))
            .await
    }

    /// Run a store call under the retry policy; exhaustion is a persistence
    /// failure.
    async fn store_op<T, F, Fut>(&self, what: &str, symbol: &str, op: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.settings
            .retry
            .run(what, symbol, &self.cancel, op)
            .await
            .map_err(|e| retry_to_sync(e, |last| SyncError::persist(symbol, &last)))
    }

    // -------------------------------------------------------------------------
    // Batch pass
    // -------------------------------------------------------------------------

    /// Symbols to walk: the configured list, else the provider listing, else
    /// every classifiable code.
    pub async fn resolve_universe(&self, configured: &[String]) -> Vec<String> {
        if !configured.is_empty() {
            return configured.to_vec();
        }
        match self.source.list_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "symbol listing unavailable, enumerating code ranges");
                symbol::universe().collect()
            }
        }
    }

    /// One sequential pass over `symbols`.
    ///
    /// Per-instrument failures are logged and counted; only cancellation and
    /// configuration errors end the pass early.
    pub async fn run_pass(&self, symbols: &[String]) -> SyncResult<PassReport> {
        let mut report = PassReport::new();
        let span = info_span!("sync_pass", pass_id = %report.pass_id);

        async {
            info!(instruments = symbols.len(), "sync pass started");
            let started = Instant::now();

            for symbol in symbols {
                if self.cancel.is_cancelled() {
                    warn!("sync pass cancelled");
                    return Err(SyncError::Cancelled);
                }

                report.attempted += 1;
                let t0 = Instant::now();

                match self.sync_instrument(symbol).await {
                    Ok(outcome) => {
                        if outcome.needs_pacing() {
                            report.synced += 1;
                            report.bars_written += outcome.written();
                            self.pace(t0.elapsed()).await?;
                        } else {
                            report.skipped += 1;
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        warn!(symbol = %symbol, "{e}");
                        return Err(e);
                    }
                    Err(e) => {
                        error!(symbol = %symbol, "{e}, skipping this cycle");
                        report.failed += 1;
                    }
                }
            }

            info!(
                attempted = report.attempted,
                synced = report.synced,
                skipped = report.skipped,
                failed = report.failed,
                bars_written = report.bars_written,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "sync pass finished"
            );
            Ok(report.clone())
        }
        .instrument(span)
        .await
    }

    /// Sleep `max(0, pace - elapsed)`, aborting on cancellation.
    async fn pace(&self, elapsed: Duration) -> SyncResult<()> {
        let remaining = self.settings.pace.saturating_sub(elapsed);
        if remaining.is_zero() {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "attempt exceeded pacing floor");
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            _ = tokio::time::sleep(remaining) => Ok(()),
        }
    }
}

fn retry_to_sync(err: RetryError, exhausted: impl FnOnce(anyhow::Error) -> SyncError) -> SyncError {
    match err {
        RetryError::Cancelled => SyncError::Cancelled,
        RetryError::Exhausted { last, .. } => exhausted(last),
    }
}
