// =============================================================================
// Upstream market data
// =============================================================================

pub mod client;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::Bar;

pub use client::SinaClient;

/// Source of raw daily bars. The orchestrator only talks to this trait so the
/// provider can be swapped or scripted in tests.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `max_bars` most recent daily bars for `symbol`, in whatever order
    /// the provider returns them. An unknown or delisted symbol yields an
    /// empty vector, not an error.
    async fn fetch_history(&self, symbol: &str, max_bars: usize) -> Result<Vec<Bar>>;

    /// Every listed A-share symbol (`sh600000`, `sz000001`, ...).
    async fn list_symbols(&self) -> Result<Vec<String>>;
}
