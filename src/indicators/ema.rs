// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The seed is the SMA of the oldest `period` closes in the slice. The seed is
// then folded forward through every later close except the current one, and
// the current close is always folded in as the final step. When the slice is
// exactly `period` long the current close is therefore part of the seed *and*
// the final fold; persisted history depends on that behaviour.
// =============================================================================

/// Longest slice any EMA recurrence walks over.
pub const MAX_EMA_SPAN: usize = 100;

/// Compute the EMA of `closes` (oldest first, last element = current bar).
///
/// Only the most recent [`MAX_EMA_SPAN`] closes are considered.
///
/// # Edge cases
/// - `period == 0` => `None`
/// - fewer than `period` closes => `None`
/// - any non-finite intermediate value => `None`
pub fn calculate_ema(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let span = &closes[closes.len().saturating_sub(MAX_EMA_SPAN)..];
    if span.len() < period {
        return None;
    }
    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the oldest `period` values.
    let mut ema = span[..period].iter().sum::<f64>() / period as f64;
    if !ema.is_finite() {
        return None;
    }

    let (current, history) = span.split_last()?;
    for &close in history.iter().skip(period) {
        ema = (close - ema) * multiplier + ema;
        if !ema.is_finite() {
            return None;
        }
    }

    ema = (current - ema) * multiplier + ema;
    ema.is_finite().then_some(ema)
}

/// Smooth an already-computed series (oldest first) with a `period` EMA.
///
/// Used for the MACD signal line. When fewer than `period` values exist the
/// plain mean of whatever is available is returned instead.
pub fn smooth(values: &[f64], period: usize) -> Option<f64> {
    if values.is_empty() || period == 0 {
        return None;
    }
    if values.len() < period {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        return mean.is_finite().then_some(mean);
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    for &v in &values[period..] {
        ema = (v - ema) * multiplier + ema;
    }

    ema.is_finite().then_some(ema)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: build a simple ascending price series.
    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_none());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[1.0, 2.0], 5).is_none());
    }

    #[test]
    fn ema_period_equals_length_folds_current_twice() {
        // Seed = (2+4+6)/3 = 4, then the current close 6 is folded once more:
        // (6 - 4) * 0.5 + 4 = 5.
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3).unwrap();
        assert!((ema - 5.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..=10]: seed = SMA(1..=5) = 3, fold 6..=9,
        // then fold the current close 10.
        let closes = ascending(10);
        let ema = calculate_ema(&closes, 5).unwrap();

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        for &c in &closes[5..] {
            expected = (c - expected) * mult + expected;
        }
        assert!((ema - expected).abs() < 1e-10, "got {ema}, expected {expected}");
    }

    #[test]
    fn ema_only_looks_at_recent_span() {
        // Prepending older history beyond the span must not change the value.
        let recent = ascending(MAX_EMA_SPAN);
        let mut longer = vec![1000.0; 50];
        longer.extend_from_slice(&recent);
        assert_eq!(calculate_ema(&recent, 12), calculate_ema(&longer, 12));
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        assert!(calculate_ema(&closes, 3).is_none());
    }

    #[test]
    fn ema_flat_series_is_flat() {
        let closes = vec![100.0; 40];
        let ema = calculate_ema(&closes, 26).unwrap();
        assert!((ema - 100.0).abs() < 1e-10);
    }

    // ---- smooth ----------------------------------------------------------

    #[test]
    fn smooth_falls_back_to_mean() {
        let v = smooth(&[1.0, 2.0, 3.0], 9).unwrap();
        assert!((v - 2.0).abs() < 1e-10);
    }

    #[test]
    fn smooth_empty_is_none() {
        assert!(smooth(&[], 9).is_none());
    }

    #[test]
    fn smooth_full_period_seeds_then_folds() {
        let values: Vec<f64> = ascending(10);
        let v = smooth(&values, 9).unwrap();
        // seed = mean(1..=9) = 5, fold 10 with 0.2 => 6
        assert!((v - 6.0).abs() < 1e-10);
    }
}
