// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the daily-bar indicators. The
// building blocks return `Option<T>` so callers are forced to handle
// insufficient-history and numerical-edge-case scenarios; `analyzer` combines
// them into the per-bar derived fields.

pub mod analyzer;
pub mod bollinger;
pub mod candle;
pub mod ema;
pub mod ma_cross;
pub mod macd;
pub mod rsi;
pub mod trend;
pub mod volume;

pub use analyzer::{analyze, enrich_new_bars, MAX_WINDOW};
