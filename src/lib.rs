// =============================================================================
// kline-sync: incremental daily-bar sync with technical indicators
// =============================================================================
//
// Fetches daily A-share bars, derives the indicator set for every new bar and
// upserts the result keyed by (symbol, trade_date).
// =============================================================================

pub mod calendar;
pub mod error;
pub mod indicators;
pub mod runtime_config;
pub mod sina;
pub mod store;
pub mod symbol;
pub mod sync;
pub mod types;

pub use error::{MalformedBar, SyncError, SyncResult};
pub use types::{Bar, Exchange, Indicators, KlineType, SyncMode};
