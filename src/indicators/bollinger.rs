// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), where σ is the population standard deviation
// of the same closes.
//
// A close "touches" a band when it comes within 1% of it.

pub const BOLL_PERIOD: usize = 20;
pub const BOLL_NUM_STD: f64 = 2.0;
/// Fractional tolerance applied to the band-touch checks.
const TOUCH_TOLERANCE: f64 = 0.01;

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerResult {
    /// `close >= upper * 0.99`
    pub fn touches_upper(&self, close: f64) -> bool {
        close >= self.upper * (1.0 - TOUCH_TOLERANCE)
    }

    /// `close <= lower * 1.01`
    pub fn touches_lower(&self, close: f64) -> bool {
        close <= self.lower * (1.0 + TOUCH_TOLERANCE)
    }
}

/// Calculate Bollinger Bands over the first `period` closes of `closes`
/// (ordered newest first).
///
/// Returns `None` when:
/// - `period` is zero or fewer than `period` closes are available.
/// - Any band is non-finite.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[..period];
    let middle = window.iter().sum::<f64>() / period as f64;

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;

    if upper.is_finite() && lower.is_finite() {
        Some(BollingerResult {
            upper,
            middle,
            lower,
        })
    } else {
        None
    }
}
