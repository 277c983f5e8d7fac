// =============================================================================
// Trend: Consecutive Days & Breakouts
// =============================================================================

use crate::types::Bar;

/// Trailing bars (excluding the current one) scanned for breakouts.
pub const BREAKOUT_LOOKBACK: usize = 20;

/// Signed length of the current rise/fall streak.
///
/// `window` is newest first with `window[0]` the current bar. The direction
/// is fixed by `window[0]` vs `window[1]` (an unchanged close counts as a
/// fall); the streak then grows by one for every older pair
/// `window[i]` vs `window[i + 1]` that moves the same way and stops at the
/// first pair that does not. The first older pair is required before any
/// count is emitted, so two bars alone yield `0`.
pub fn consecutive_days(window: &[Bar]) -> i32 {
    let Some(current) = window.first() else {
        return 0;
    };

    let mut days = 0_i32;
    for i in 1..window.len() {
        let prev = &window[i];
        let Some(older) = window.get(i + 1) else {
            break;
        };
        let is_rising = prev.close > older.close;

        if i == 1 {
            days = if current.close > prev.close { 1 } else { -1 };
        }

        if days > 0 && is_rising {
            days += 1;
        } else if days < 0 && !is_rising {
            days -= 1;
        } else {
            break;
        }
    }
    days
}

/// `(is_break_high, is_break_low)` for `window[0]` against the trailing
/// `min(20, len - 1)` bars. `None` when no earlier bar exists.
pub fn breakout(window: &[Bar]) -> Option<(bool, bool)> {
    let (current, history) = window.split_first()?;
    let lookback = &history[..history.len().min(BREAKOUT_LOOKBACK)];
    if lookback.is_empty() {
        return None;
    }

    let max_high = lookback.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let min_low = lookback.iter().map(|b| b.low).fold(f64::MAX, f64::min);

    Some((current.close > max_high, current.close < min_low))
}
