// =============================================================================
// Relative Strength Index (RSI)
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether a stock is overbought or oversold.
//
// Step 1: Take the most recent `period` close-over-close deltas.
// Step 2: Sum positive deltas as gains, negative deltas as losses.
// Step 3: RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// A window with no losing day (including a perfectly flat one) reads 100.
//
// Thresholds (applied to RSI6):  RSI > 80 => overbought,  RSI < 20 => oversold.
// =============================================================================

pub const RSI_PERIODS: [usize; 3] = [6, 12, 24];
pub const OVERBOUGHT: f64 = 80.0;
pub const OVERSOLD: f64 = 20.0;

/// Compute RSI from `closes` ordered **newest first** (`closes[0]` is the
/// current bar).
///
/// # Edge cases
/// - `period == 0` => `None`
/// - `closes.len() < period + 1` => `None` (need `period` deltas)
/// - non-finite result => `None`
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let (sum_gain, sum_loss) = closes[..=period]
        .windows(2)
        .map(|w| w[0] - w[1])
        .fold((0.0_f64, 0.0_f64), |(g, l), d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l + d.abs())
            }
        });

    if sum_loss == 0.0 {
        return Some(100.0);
    }

    let period_f = period as f64;
    let rs = (sum_gain / period_f) / (sum_loss / period_f);
    let rsi = 100.0 - 100.0 / (1.0 + rs);

    rsi.is_finite().then_some(rsi)
}

/// Overbought / oversold flags for an RSI6 reading.
pub fn rsi_zone(rsi6: f64) -> (bool, bool) {
    (rsi6 > OVERBOUGHT, rsi6 < OVERSOLD)
}
