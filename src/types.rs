// =============================================================================
// Shared types used across the K-line sync pipeline
// =============================================================================

use chrono::NaiveDate;

/// Candle body classification: 0 = bearish, 1 = bullish, 2 = doji.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlineType {
    Bearish,
    Bullish,
    Doji,
}

impl KlineType {
    /// Stable numeric code used in the persisted `kline_type` column.
    pub fn code(self) -> i64 {
        match self {
            Self::Bearish => 0,
            Self::Bullish => 1,
            Self::Doji => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Bearish),
            1 => Some(Self::Bullish),
            2 => Some(Self::Doji),
            _ => None,
        }
    }
}

impl std::fmt::Display for KlineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearish => write!(f, "Bearish"),
            Self::Bullish => write!(f, "Bullish"),
            Self::Doji => write!(f, "Doji"),
        }
    }
}

/// Exchange segment an A-share code trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Exchange {
    /// Symbol prefix used by the upstream provider (`sh600000`).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Shanghai => "sh",
            Self::Shenzhen => "sz",
            Self::Beijing => "bj",
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Whether an instrument already has persisted history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental(NaiveDate),
}

impl SyncMode {
    pub fn from_cursor(cursor: Option<NaiveDate>) -> Self {
        match cursor {
            Some(date) => Self::Incremental(date),
            None => Self::Full,
        }
    }

    pub fn cursor(self) -> Option<NaiveDate> {
        match self {
            Self::Full => None,
            Self::Incremental(date) => Some(date),
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "Full"),
            Self::Incremental(date) => write!(f, "Incremental({date})"),
        }
    }
}

// =============================================================================
// Bar
// =============================================================================

/// Every field the indicator engine derives for a bar.
///
/// `None` means "not computable from the history that was available", which
/// is distinct from a computed zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indicators {
    // --- Change -------------------------------------------------------------
    pub change_pct: Option<f64>,
    pub amplitude: Option<f64>,
    /// The provider does not publish float shares, so this stays `None`.
    pub turnover_rate: Option<f64>,

    // --- Moving-average system ----------------------------------------------
    pub is_ma5_golden_cross: Option<bool>,
    pub is_ma5_death_cross: Option<bool>,
    pub is_ma10_golden_cross: Option<bool>,
    pub is_ma10_death_cross: Option<bool>,
    pub is_ma_bullish: Option<bool>,
    pub is_ma_bearish: Option<bool>,

    // --- Candle pattern -----------------------------------------------------
    pub kline_type: Option<KlineType>,
    pub upper_shadow_ratio: Option<f64>,
    pub lower_shadow_ratio: Option<f64>,
    pub body_ratio: Option<f64>,
    pub is_doji: Option<bool>,
    pub is_hammer: Option<bool>,
    pub is_inverted_hammer: Option<bool>,

    // --- Trend --------------------------------------------------------------
    /// Signed streak length: positive = consecutive rises, negative = falls.
    pub consecutive_days: Option<i32>,
    pub is_break_high: Option<bool>,
    pub is_break_low: Option<bool>,

    // --- Volume -------------------------------------------------------------
    pub volume_ratio: Option<f64>,
    pub is_volume_surge: Option<bool>,
    pub is_volume_shrink: Option<bool>,
    pub is_price_volume_match: Option<bool>,

    // --- MACD ---------------------------------------------------------------
    pub macd_dif: Option<f64>,
    pub macd_dea: Option<f64>,
    pub macd_bar: Option<f64>,
    pub is_macd_golden_cross: Option<bool>,
    pub is_macd_death_cross: Option<bool>,

    // --- RSI ----------------------------------------------------------------
    pub rsi6: Option<f64>,
    pub rsi12: Option<f64>,
    pub rsi24: Option<f64>,
    pub is_overbought: Option<bool>,
    pub is_oversold: Option<bool>,

    // --- Bollinger ----------------------------------------------------------
    pub boll_upper: Option<f64>,
    pub boll_middle: Option<f64>,
    pub boll_lower: Option<f64>,
    pub is_touch_boll_upper: Option<bool>,
    pub is_touch_boll_lower: Option<bool>,
}

/// One trading day for one instrument. `(symbol, trade_date)` is the
/// persistence key.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    /// Provider symbol including the exchange prefix, e.g. `sz000001`.
    pub symbol: String,
    /// Bare six-digit code, e.g. `000001`.
    pub code: String,
    pub trade_date: NaiveDate,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,

    // Rolling averages published by the provider.
    pub ma_price5: f64,
    pub ma_price10: f64,
    pub ma_price30: f64,
    pub ma_volume5: u64,
    pub ma_volume10: u64,
    pub ma_volume30: u64,

    pub indicators: Indicators,
}

impl Bar {
    /// Build a raw bar with no provider averages and no derived fields.
    pub fn new(
        symbol: impl Into<String>,
        trade_date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        let symbol = symbol.into();
        let code = code_of(&symbol).to_string();
        Self {
            symbol,
            code,
            trade_date,
            open,
            high,
            low,
            close,
            volume,
            ma_price5: 0.0,
            ma_price10: 0.0,
            ma_price30: 0.0,
            ma_volume5: 0,
            ma_volume10: 0,
            ma_volume30: 0,
            indicators: Indicators::default(),
        }
    }

    /// Check the OHLC envelope: `high >= max(open, close)`,
    /// `low <= min(open, close)`, and every price finite.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite())
            && self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

/// Strip the two-letter exchange prefix from a provider symbol.
pub fn code_of(symbol: &str) -> &str {
    match symbol.get(..2) {
        Some(prefix) if prefix.chars().all(|c| c.is_ascii_alphabetic()) => &symbol[2..],
        _ => symbol,
    }
}
