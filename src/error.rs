// =============================================================================
// Error taxonomy for the sync pipeline
// =============================================================================
//
// Adapters (HTTP client, store, config file) report `anyhow::Error` with
// context attached. The orchestrator folds those into `SyncError` at its
// boundary so callers can tell per-instrument failures from pass-ending ones.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Upstream fetch kept failing after every retry.
    #[error("fetch failed for {symbol}: {message}")]
    Fetch { symbol: String, message: String },

    /// Writing bars or the attempt log kept failing after every retry.
    #[error("persist failed for {symbol}: {message}")]
    Persist { symbol: String, message: String },

    /// Operator-requested shutdown observed at a sleep point.
    #[error("sync pass cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn fetch(symbol: &str, err: &anyhow::Error) -> Self {
        Self::Fetch {
            symbol: symbol.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn persist(symbol: &str, err: &anyhow::Error) -> Self {
        Self::Persist {
            symbol: symbol.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Fatal errors end the whole pass; everything else only skips one
    /// instrument.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Config(_))
    }
}

/// A raw bar whose OHLC envelope is inconsistent (`high < low` and friends).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed bar {symbol} {trade_date}: o={open} h={high} l={low} c={close}")]
pub struct MalformedBar {
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
