// =============================================================================
// SQLite history store (sqlx)
// =============================================================================
//
// Tables:
//   stock_history  one row per (symbol, trade_date), raw + derived columns
//   sync_log       one row per (symbol, sync_date) successful attempt
//
// `upsert_many` writes every chunk of a batch inside one transaction with
// `INSERT .. ON CONFLICT(symbol, trade_date) DO UPDATE SET col = excluded.col`
// for every non-key column, so a retry after a partial failure rewrites the
// whole batch or nothing.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info, instrument};

use super::HistoryStore;
use crate::types::{Bar, Indicators, KlineType};

/// Rows per INSERT statement; 52 columns keeps each statement well under
/// SQLite's 32766 bind-parameter ceiling.
const ROWS_PER_STATEMENT: usize = 500;

/// Every `stock_history` column in insert order. The first two form the key.
const COLUMNS: [&str; 52] = [
    "symbol",
    "trade_date",
    "code",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "ma_price5",
    "ma_price10",
    "ma_price30",
    "ma_volume5",
    "ma_volume10",
    "ma_volume30",
    "change_pct",
    "amplitude",
    "turnover_rate",
    "is_ma5_golden_cross",
    "is_ma5_death_cross",
    "is_ma10_golden_cross",
    "is_ma10_death_cross",
    "is_ma_bullish",
    "is_ma_bearish",
    "kline_type",
    "upper_shadow_ratio",
    "lower_shadow_ratio",
    "body_ratio",
    "is_doji",
    "is_hammer",
    "is_inverted_hammer",
    "consecutive_days",
    "is_break_high",
    "is_break_low",
    "volume_ratio",
    "is_volume_surge",
    "is_volume_shrink",
    "is_price_volume_match",
    "macd_dif",
    "macd_dea",
    "macd_bar",
    "is_macd_golden_cross",
    "is_macd_death_cross",
    "rsi6",
    "rsi12",
    "rsi24",
    "is_overbought",
    "is_oversold",
    "boll_upper",
    "boll_middle",
    "boll_lower",
    "is_touch_boll_upper",
    "is_touch_boll_lower",
];

const CREATE_HISTORY: &str = r#"
    CREATE TABLE IF NOT EXISTS stock_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        trade_date TEXT NOT NULL,
        code TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume INTEGER NOT NULL,
        ma_price5 REAL NOT NULL DEFAULT 0,
        ma_price10 REAL NOT NULL DEFAULT 0,
        ma_price30 REAL NOT NULL DEFAULT 0,
        ma_volume5 INTEGER NOT NULL DEFAULT 0,
        ma_volume10 INTEGER NOT NULL DEFAULT 0,
        ma_volume30 INTEGER NOT NULL DEFAULT 0,
        change_pct REAL,
        amplitude REAL,
        turnover_rate REAL,
        is_ma5_golden_cross INTEGER,
        is_ma5_death_cross INTEGER,
        is_ma10_golden_cross INTEGER,
        is_ma10_death_cross INTEGER,
        is_ma_bullish INTEGER,
        is_ma_bearish INTEGER,
        kline_type INTEGER,
        upper_shadow_ratio REAL,
        lower_shadow_ratio REAL,
        body_ratio REAL,
        is_doji INTEGER,
        is_hammer INTEGER,
        is_inverted_hammer INTEGER,
        consecutive_days INTEGER,
        is_break_high INTEGER,
        is_break_low INTEGER,
        volume_ratio REAL,
        is_volume_surge INTEGER,
        is_volume_shrink INTEGER,
        is_price_volume_match INTEGER,
        macd_dif REAL,
        macd_dea REAL,
        macd_bar REAL,
        is_macd_golden_cross INTEGER,
        is_macd_death_cross INTEGER,
        rsi6 REAL,
        rsi12 REAL,
        rsi24 REAL,
        is_overbought INTEGER,
        is_oversold INTEGER,
        boll_upper REAL,
        boll_middle REAL,
        boll_lower REAL,
        is_touch_boll_upper INTEGER,
        is_touch_boll_lower INTEGER,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
"#;

const CREATE_SYNC_LOG: &str = r#"
    CREATE TABLE IF NOT EXISTS sync_log (
        symbol TEXT NOT NULL,
        sync_date TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (symbol, sync_date)
    )
"#;

const INDEXES: [&str; 2] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_stock_history_unique ON stock_history(symbol, trade_date)",
    "CREATE INDEX IF NOT EXISTS idx_stock_history_date ON stock_history(trade_date DESC)",
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply the schema.
    ///
    /// In-memory URLs are pinned to a single connection so every query sees
    /// the same database.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url {url}"))?
            .create_if_missing(true)
            .journal_mode(if in_memory { SqliteJournalMode::Memory } else { SqliteJournalMode::Wal })
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open {url}"))?;

        let store = Self { pool };
        store.initialize().await?;
        info!(url, "history store ready");
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(CREATE_HISTORY)
            .execute(&self.pool)
            .await
            .context("create stock_history")?;
        sqlx::query(CREATE_SYNC_LOG)
            .execute(&self.pool)
            .await
            .context("create sync_log")?;
        for index in INDEXES {
            sqlx::query(index).execute(&self.pool).await.context("create index")?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn select_columns() -> String {
    COLUMNS.join(", ")
}

fn push_bar(mut b: sqlx::query_builder::Separated<'_, '_, Sqlite, &'static str>, bar: &Bar) {
    let i = &bar.indicators;
    b.push_bind(bar.symbol.clone())
        .push_bind(bar.trade_date)
        .push_bind(bar.code.clone())
        .push_bind(bar.open)
        .push_bind(bar.high)
        .push_bind(bar.low)
        .push_bind(bar.close)
        .push_bind(bar.volume as i64)
        .push_bind(bar.ma_price5)
        .push_bind(bar.ma_price10)
        .push_bind(bar.ma_price30)
        .push_bind(bar.ma_volume5 as i64)
        .push_bind(bar.ma_volume10 as i64)
        .push_bind(bar.ma_volume30 as i64)
        .push_bind(i.change_pct)
        .push_bind(i.amplitude)
        .push_bind(i.turnover_rate)
        .push_bind(i.is_ma5_golden_cross)
        .push_bind(i.is_ma5_death_cross)
        .push_bind(i.is_ma10_golden_cross)
        .push_bind(i.is_ma10_death_cross)
        .push_bind(i.is_ma_bullish)
        .push_bind(i.is_ma_bearish)
        .push_bind(i.kline_type.map(KlineType::code))
        .push_bind(i.upper_shadow_ratio)
        .push_bind(i.lower_shadow_ratio)
        .push_bind(i.body_ratio)
        .push_bind(i.is_doji)
        .push_bind(i.is_hammer)
        .push_bind(i.is_inverted_hammer)
        .push_bind(i.consecutive_days)
        .push_bind(i.is_break_high)
        .push_bind(i.is_break_low)
        .push_bind(i.volume_ratio)
        .push_bind(i.is_volume_surge)
        .push_bind(i.is_volume_shrink)
        .push_bind(i.is_price_volume_match)
        .push_bind(i.macd_dif)
        .push_bind(i.macd_dea)
        .push_bind(i.macd_bar)
        .push_bind(i.is_macd_golden_cross)
        .push_bind(i.is_macd_death_cross)
        .push_bind(i.rsi6)
        .push_bind(i.rsi12)
        .push_bind(i.rsi24)
        .push_bind(i.is_overbought)
        .push_bind(i.is_oversold)
        .push_bind(i.boll_upper)
        .push_bind(i.boll_middle)
        .push_bind(i.boll_lower)
        .push_bind(i.is_touch_boll_upper)
        .push_bind(i.is_touch_boll_lower);
}

fn row_to_bar(row: &SqliteRow) -> Result<Bar, sqlx::Error> {
    let indicators = Indicators {
        change_pct: row.try_get("change_pct")?,
        amplitude: row.try_get("amplitude")?,
        turnover_rate: row.try_get("turnover_rate")?,
        is_ma5_golden_cross: row.try_get("is_ma5_golden_cross")?,
        is_ma5_death_cross: row.try_get("is_ma5_death_cross")?,
        is_ma10_golden_cross: row.try_get("is_ma10_golden_cross")?,
        is_ma10_death_cross: row.try_get("is_ma10_death_cross")?,
        is_ma_bullish: row.try_get("is_ma_bullish")?,
        is_ma_bearish: row.try_get("is_ma_bearish")?,
        kline_type: row
            .try_get::<Option<i64>, _>("kline_type")?
            .and_then(KlineType::from_code),
        upper_shadow_ratio: row.try_get("upper_shadow_ratio")?,
        lower_shadow_ratio: row.try_get("lower_shadow_ratio")?,
        body_ratio: row.try_get("body_ratio")?,
        is_doji: row.try_get("is_doji")?,
        is_hammer: row.try_get("is_hammer")?,
        is_inverted_hammer: row.try_get("is_inverted_hammer")?,
        consecutive_days: row.try_get("consecutive_days")?,
        is_break_high: row.try_get("is_break_high")?,
        is_break_low: row.try_get("is_break_low")?,
        volume_ratio: row.try_get("volume_ratio")?,
        is_volume_surge: row.try_get("is_volume_surge")?,
        is_volume_shrink: row.try_get("is_volume_shrink")?,
        is_price_volume_match: row.try_get("is_price_volume_match")?,
        macd_dif: row.try_get("macd_dif")?,
        macd_dea: row.try_get("macd_dea")?,
        macd_bar: row.try_get("macd_bar")?,
        is_macd_golden_cross: row.try_get("is_macd_golden_cross")?,
        is_macd_death_cross: row.try_get("is_macd_death_cross")?,
        rsi6: row.try_get("rsi6")?,
        rsi12: row.try_get("rsi12")?,
        rsi24: row.try_get("rsi24")?,
        is_overbought: row.try_get("is_overbought")?,
        is_oversold: row.try_get("is_oversold")?,
        boll_upper: row.try_get("boll_upper")?,
        boll_middle: row.try_get("boll_middle")?,
        boll_lower: row.try_get("boll_lower")?,
        is_touch_boll_upper: row.try_get("is_touch_boll_upper")?,
        is_touch_boll_lower: row.try_get("is_touch_boll_lower")?,
    };

    Ok(Bar {
        symbol: row.try_get("symbol")?,
        code: row.try_get("code")?,
        trade_date: row.try_get("trade_date")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get::<i64, _>("volume")?.max(0) as u64,
        ma_price5: row.try_get("ma_price5")?,
        ma_price10: row.try_get("ma_price10")?,
        ma_price30: row.try_get("ma_price30")?,
        ma_volume5: row.try_get::<i64, _>("ma_volume5")?.max(0) as u64,
        ma_volume10: row.try_get::<i64, _>("ma_volume10")?.max(0) as u64,
        ma_volume30: row.try_get::<i64, _>("ma_volume30")?.max(0) as u64,
        indicators,
    })
}

#[async_trait]
impl HistoryStore for SqliteStore {
    #[instrument(skip(self, bars), fields(rows = bars.len()))]
    async fn upsert_many(&self, bars: &[Bar]) -> Result<u64> {
        if bars.is_empty() {
            return Ok(0);
        }

        let update_clause = COLUMNS[2..]
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await.context("begin upsert transaction")?;
        let mut affected = 0;

        for chunk in bars.chunks(ROWS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO stock_history ({}) ", select_columns()));
            qb.push_values(chunk, |b, bar| push_bar(b, bar));
            qb.push(" ON CONFLICT(symbol, trade_date) DO UPDATE SET ");
            qb.push(&update_clause);
            qb.push(", updated_at = CURRENT_TIMESTAMP");

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .context("upsert stock_history chunk")?;
            affected += result.rows_affected();
        }

        tx.commit().await.context("commit upsert transaction")?;
        debug!(affected, "upsert committed");
        Ok(affected)
    }

    async fn latest_trade_date(&self, symbol: &str) -> Result<Option<NaiveDate>> {
        let date: Option<NaiveDate> =
            sqlx::query_scalar("SELECT MAX(trade_date) FROM stock_history WHERE symbol = ?1")
                .bind(symbol)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("latest_trade_date({symbol})"))?;
        Ok(date)
    }

    async fn bars_before(&self, symbol: &str, before: NaiveDate, limit: usize) -> Result<Vec<Bar>> {
        let sql = format!(
            "SELECT {} FROM stock_history WHERE symbol = ?1 AND trade_date < ?2 \
             ORDER BY trade_date DESC LIMIT ?3",
            select_columns()
        );
        let rows = sqlx::query(&sql)
            .bind(symbol)
            .bind(before)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("bars_before({symbol}, {before}, {limit})"))?;
        rows.iter()
            .map(row_to_bar)
            .collect::<Result<Vec<_>, _>>()
            .context("decode stock_history row")
    }

    async fn has_attempt(&self, symbol: &str, date: NaiveDate) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_log WHERE symbol = ?1 AND sync_date = ?2")
                .bind(symbol)
                .bind(date)
                .fetch_one(&self.pool)
                .await
                .with_context(|| format!("has_attempt({symbol}, {date})"))?;
        Ok(count > 0)
    }

    async fn record_attempt(&self, symbol: &str, date: NaiveDate) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO sync_log (symbol, sync_date) VALUES (?1, ?2)")
            .bind(symbol)
            .bind(date)
            .execute(&self.pool)
            .await
            .with_context(|| format!("record_attempt({symbol}, {date})"))?;
        Ok(())
    }
}
