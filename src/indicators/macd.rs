// =============================================================================
// MACD: DIF / DEA / BAR
// =============================================================================
//
//   DIF = EMA(12) - EMA(26)
//   DEA = 9-period EMA of the DIF series
//   BAR = 2 * (DIF - DEA)
//
// The DIF series is whatever DIF values earlier bars in the window already
// carry, followed by the freshly computed DIF of the current bar. Bars whose
// MACD was never computed simply do not contribute.
// =============================================================================

use crate::indicators::ema::{calculate_ema, smooth, MAX_EMA_SPAN};
use crate::types::Bar;

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;

/// MACD triple for a single bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub dif: f64,
    pub dea: f64,
    pub bar: f64,
}

/// Compute MACD for the bar at `window[0]`.
///
/// `closes` are the window closes oldest first (current last); `window` is
/// the same history newest first, used to read previously derived DIF values.
/// Returns `None` with fewer than [`SLOW_PERIOD`] bars.
pub fn calculate_macd(closes: &[f64], window: &[Bar]) -> Option<Macd> {
    if closes.len() < SLOW_PERIOD {
        return None;
    }

    let dif = calculate_ema(closes, FAST_PERIOD)? - calculate_ema(closes, SLOW_PERIOD)?;

    let mut difs: Vec<f64> = window
        .iter()
        .take(MAX_EMA_SPAN)
        .skip(1)
        .rev()
        .filter_map(|b| b.indicators.macd_dif)
        .collect();
    difs.push(dif);

    let dea = smooth(&difs, SIGNAL_PERIOD)?;
    let bar = 2.0 * (dif - dea);

    bar.is_finite().then_some(Macd { dif, dea, bar })
}

/// Golden / death cross of DIF over DEA between two consecutive bars.
///
/// Returns `None` when the previous bar has no MACD values.
pub fn macd_cross(previous: &Bar, current: &Macd) -> Option<(bool, bool)> {
    let prev_dif = previous.indicators.macd_dif?;
    let prev_dea = previous.indicators.macd_dea?;

    let golden = prev_dif <= prev_dea && current.dif > current.dea;
    let death = prev_dif >= prev_dea && current.dif < current.dea;
    Some((golden, death))
}
