// =============================================================================
// Bar Analyzer: populates every derived field of one bar
// =============================================================================
//
// `analyze` is a pure function of:
//   - the current bar's own raw fields,
//   - the immediately preceding bar (for change %, MA / MACD crosses),
//   - a newest-first window whose first element is the current bar.
//
// Each indicator family is evaluated independently. Whatever cannot be
// computed from the history supplied stays `None`.
//
// Evaluation order: change -> MA -> candle -> trend -> volume -> MACD -> RSI
// -> Bollinger. Volume depends on change %; nothing else depends on order.
// =============================================================================

use tracing::warn;

use crate::error::MalformedBar;
use crate::indicators::bollinger::{calculate_bollinger, BOLL_NUM_STD, BOLL_PERIOD};
use crate::indicators::candle::classify;
use crate::indicators::ma_cross::{alignment, ma10_cross, ma5_cross};
use crate::indicators::macd::{calculate_macd, macd_cross};
use crate::indicators::rsi::{calculate_rsi, rsi_zone};
use crate::indicators::trend::{breakout, consecutive_days};
use crate::indicators::volume::{price_volume_match, volume_signal};
use crate::types::{Bar, Indicators};

/// Longest window handed to the engine for a single bar.
pub const MAX_WINDOW: usize = 100;

/// Populate `current.indicators`.
///
/// `window[0]` is expected to be `current` itself (raw fields); only
/// `window[1..]` is read for history. Derived fields from a previous run are
/// discarded first, so calling this twice with the same inputs is a no-op.
///
/// A bar with an inconsistent OHLC envelope is left with every derived field
/// unset and reported as [`MalformedBar`].
pub fn analyze(current: &mut Bar, previous: Option<&Bar>, window: &[Bar]) -> Result<(), MalformedBar> {
    current.indicators = Indicators::default();

    if !current.is_well_formed() {
        return Err(MalformedBar {
            symbol: current.symbol.clone(),
            trade_date: current.trade_date,
            open: current.open,
            high: current.high,
            low: current.low,
            close: current.close,
        });
    }

    let window = &window[..window.len().min(MAX_WINDOW)];
    // Newest first, current close in front.
    let closes_desc: Vec<f64> = std::iter::once(current.close)
        .chain(window.iter().skip(1).map(|b| b.close))
        .collect();
    let closes_asc: Vec<f64> = closes_desc.iter().rev().copied().collect();

    let mut ind = Indicators::default();

    // ── Change / amplitude ──────────────────────────────────────────────
    let (change_pct, amplitude) = match previous {
        Some(prev) if prev.close != 0.0 => (
            (current.close - prev.close) / prev.close * 100.0,
            (current.high - current.low) / prev.close * 100.0,
        ),
        _ => (0.0, 0.0),
    };
    ind.change_pct = finite(change_pct);
    ind.amplitude = finite(amplitude);

    // ── Moving averages ─────────────────────────────────────────────────
    if let Some(prev) = previous {
        if let Some(cross) = ma5_cross(prev, current) {
            ind.is_ma5_golden_cross = Some(cross.golden);
            ind.is_ma5_death_cross = Some(cross.death);
        }
        if let Some(cross) = ma10_cross(prev, current) {
            ind.is_ma10_golden_cross = Some(cross.golden);
            ind.is_ma10_death_cross = Some(cross.death);
        }
    }
    if let Some((bullish, bearish)) = alignment(current) {
        ind.is_ma_bullish = Some(bullish);
        ind.is_ma_bearish = Some(bearish);
    }

    // ── Candle ──────────────────────────────────────────────────────────
    if let Some(shape) = classify(current.open, current.high, current.low, current.close) {
        ind.kline_type = Some(shape.kline_type);
        ind.upper_shadow_ratio = finite(shape.upper_shadow_ratio);
        ind.lower_shadow_ratio = finite(shape.lower_shadow_ratio);
        ind.body_ratio = finite(shape.body_ratio);
        ind.is_doji = Some(shape.is_doji());
        ind.is_hammer = Some(shape.is_hammer);
        ind.is_inverted_hammer = Some(shape.is_inverted_hammer);
    }

    // ── Trend ───────────────────────────────────────────────────────────
    if !window.is_empty() {
        ind.consecutive_days = Some(consecutive_days(window));
    }
    if let Some((high, low)) = breakout(window) {
        ind.is_break_high = Some(high);
        ind.is_break_low = Some(low);
    }

    // ── Volume ──────────────────────────────────────────────────────────
    if let Some(vol) = volume_signal(current.volume, current.ma_volume5) {
        ind.volume_ratio = finite(vol.ratio);
        ind.is_volume_surge = Some(vol.is_surge);
        ind.is_volume_shrink = Some(vol.is_shrink);
        ind.is_price_volume_match = ind.change_pct.map(|chg| price_volume_match(chg, vol.ratio));
    }

    // ── MACD ────────────────────────────────────────────────────────────
    if let Some(macd) = calculate_macd(&closes_asc, window) {
        ind.macd_dif = Some(macd.dif);
        ind.macd_dea = Some(macd.dea);
        ind.macd_bar = Some(macd.bar);
        if let Some((golden, death)) = previous.and_then(|p| macd_cross(p, &macd)) {
            ind.is_macd_golden_cross = Some(golden);
            ind.is_macd_death_cross = Some(death);
        }
    }

    // ── RSI ─────────────────────────────────────────────────────────────
    ind.rsi6 = calculate_rsi(&closes_desc, 6);
    ind.rsi12 = calculate_rsi(&closes_desc, 12);
    ind.rsi24 = calculate_rsi(&closes_desc, 24);
    if let Some(rsi6) = ind.rsi6 {
        let (overbought, oversold) = rsi_zone(rsi6);
        ind.is_overbought = Some(overbought);
        ind.is_oversold = Some(oversold);
    }

    // ── Bollinger ───────────────────────────────────────────────────────
    if let Some(bb) = calculate_bollinger(&closes_desc, BOLL_PERIOD, BOLL_NUM_STD) {
        ind.boll_upper = Some(bb.upper);
        ind.boll_middle = Some(bb.middle);
        ind.boll_lower = Some(bb.lower);
        ind.is_touch_boll_upper = Some(bb.touches_upper(current.close));
        ind.is_touch_boll_lower = Some(bb.touches_lower(current.close));
    }

    current.indicators = ind;
    Ok(())
}

/// Enrich the first `new_count` bars of a newest-first `batch` in place.
///
/// Bars are processed oldest-new first so every bar sees derived values on
/// its predecessors. Everything after index `new_count` is history: already
/// enriched bars (fetched or persisted) that only feed `previous` and the
/// window.
///
/// Returns the number of malformed bars (left without derived fields).
pub fn enrich_new_bars(batch: &mut [Bar], new_count: usize) -> usize {
    let new_count = new_count.min(batch.len());
    let mut malformed = 0;

    for i in (0..new_count).rev() {
        let mut current = batch[i].clone();
        let end = (i + MAX_WINDOW).min(batch.len());
        let previous = batch.get(i + 1);

        if let Err(e) = analyze(&mut current, previous, &batch[i..end]) {
            warn!(symbol = %e.symbol, trade_date = %e.trade_date, "{e}, derived fields left unset");
            malformed += 1;
        }
        batch[i] = current;
    }
    malformed
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KlineType;
    use chrono::{Duration, NaiveDate};

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + Duration::days(i as i64)
    }

    /// Oldest-first closes -> newest-first bars with a small envelope.
    fn batch(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let mut b = Bar::new("sz000001", day(i), c, c * 1.01, c * 0.99, c, 1_000_000);
                b.ma_volume5 = 1_000_000;
                b
            })
            .rev()
            .collect()
    }

    fn wavy(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + (i as f64 * 0.7).sin() + i as f64 * 0.05).collect()
    }

    /// Analyze `window[0]` with `window[1]` as previous.
    fn analyze_head(window: &[Bar]) -> Bar {
        let mut cur = window[0].clone();
        analyze(&mut cur, window.get(1), window).unwrap();
        cur
    }

    // ---- change / amplitude -------------------------------------------

    #[test]
    fn change_without_previous_is_zero() {
        let w = batch(&[10.0]);
        let cur = analyze_head(&w);
        assert_eq!(cur.indicators.change_pct, Some(0.0));
        assert_eq!(cur.indicators.amplitude, Some(0.0));
    }

    #[test]
    fn change_and_amplitude() {
        let w = batch(&[10.0, 11.0]);
        let cur = analyze_head(&w);
        assert!((cur.indicators.change_pct.unwrap() - 10.0).abs() < 1e-9);
        // (11.11 - 10.89) / 10 * 100
        assert!((cur.indicators.amplitude.unwrap() - 2.2).abs() < 1e-9);
    }

    #[test]
    fn zero_previous_close_yields_zero_change() {
        let mut w = batch(&[10.0, 11.0]);
        w[1].close = 0.0;
        let cur = analyze_head(&w);
        assert_eq!(cur.indicators.change_pct, Some(0.0));
    }

    // ---- minimum windows ------------------------------------------------

    #[test]
    fn macd_minimum_window() {
        let w = batch(&wavy(25));
        assert!(analyze_head(&w).indicators.macd_dif.is_none());
        let w = batch(&wavy(26));
        let cur = analyze_head(&w);
        assert!(cur.indicators.macd_dif.is_some());
        assert!(cur.indicators.macd_dea.is_some());
        assert!(cur.indicators.macd_bar.is_some());
    }

    #[test]
    fn bollinger_minimum_window() {
        let w = batch(&wavy(19));
        assert!(analyze_head(&w).indicators.boll_middle.is_none());
        let w = batch(&wavy(20));
        let cur = analyze_head(&w);
        assert!(cur.indicators.boll_upper.is_some());
        assert!(cur.indicators.is_touch_boll_upper.is_some());
    }

    #[test]
    fn rsi_minimum_windows() {
        for period in [6, 12, 24] {
            let pick = |b: &Bar| match period {
                6 => b.indicators.rsi6,
                12 => b.indicators.rsi12,
                _ => b.indicators.rsi24,
            };
            let w = batch(&wavy(period));
            assert!(pick(&analyze_head(&w)).is_none(), "rsi{period} with {period} bars");
            let w = batch(&wavy(period + 1));
            assert!(pick(&analyze_head(&w)).is_some(), "rsi{period} with {} bars", period + 1);
        }
    }

    #[test]
    fn short_window_leaves_overbought_unset() {
        let w = batch(&wavy(5));
        let cur = analyze_head(&w);
        assert!(cur.indicators.rsi6.is_none());
        assert!(cur.indicators.is_overbought.is_none());
    }

    // ---- cross, candle, rsi, volume -----------------------------------

    #[test]
    fn ma_golden_cross_from_previous() {
        let mut w = batch(&[10.0, 10.1]);
        w[1].ma_price5 = 9.5;
        w[1].ma_price10 = 10.0;
        w[1].ma_price30 = 9.0;
        w[0].ma_price5 = 10.2;
        w[0].ma_price10 = 10.0;
        w[0].ma_price30 = 9.0;
        let cur = analyze_head(&w);
        assert_eq!(cur.indicators.is_ma5_golden_cross, Some(true));
        assert_eq!(cur.indicators.is_ma5_death_cross, Some(false));
        assert_eq!(cur.indicators.is_ma_bullish, Some(true));
        assert_eq!(cur.indicators.is_ma_bearish, Some(false));
    }

    #[test]
    fn ma_cross_needs_previous() {
        let mut w = batch(&[10.0]);
        w[0].ma_price5 = 10.2;
        w[0].ma_price10 = 10.0;
        let cur = analyze_head(&w);
        assert!(cur.indicators.is_ma5_golden_cross.is_none());
    }

    #[test]
    fn candle_boundaries() {
        let mut doji = Bar::new("sz000001", day(0), 10.0, 11.0, 9.0, 10.01, 1);
        let w = vec![doji.clone()];
        analyze(&mut doji, None, &w).unwrap();
        assert_eq!(doji.indicators.kline_type, Some(KlineType::Doji));
        assert_eq!(doji.indicators.is_doji, Some(true));

        let mut bull = Bar::new("sz000001", day(0), 10.0, 11.5, 9.5, 11.0, 1);
        let w = vec![bull.clone()];
        analyze(&mut bull, None, &w).unwrap();
        assert_eq!(bull.indicators.kline_type, Some(KlineType::Bullish));
        assert_eq!(bull.indicators.is_doji, Some(false));
    }

    #[test]
    fn flat_candle_skips_pattern_fields() {
        let mut flat = Bar::new("sz000001", day(0), 10.0, 10.0, 10.0, 10.0, 1);
        let w = vec![flat.clone()];
        analyze(&mut flat, None, &w).unwrap();
        assert!(flat.indicators.kline_type.is_none());
        assert!(flat.indicators.body_ratio.is_none());
    }

    #[test]
    fn rising_closes_read_rsi_100() {
        let closes: Vec<f64> = (0..10).map(|i| 10.0 + 0.2 * i as f64).collect();
        let cur = analyze_head(&batch(&closes));
        assert_eq!(cur.indicators.rsi6, Some(100.0));
        assert_eq!(cur.indicators.is_overbought, Some(true));
        assert_eq!(cur.indicators.consecutive_days, Some(9));
    }

    #[test]
    fn volume_surge() {
        let mut w = batch(&[10.0, 10.5]);
        w[0].volume = 1_600_000;
        w[0].ma_volume5 = 1_000_000;
        let cur = analyze_head(&w);
        assert!((cur.indicators.volume_ratio.unwrap() - 1.6).abs() < 1e-12);
        assert_eq!(cur.indicators.is_volume_surge, Some(true));
        assert_eq!(cur.indicators.is_volume_shrink, Some(false));
        assert_eq!(cur.indicators.is_price_volume_match, Some(true));
    }

    #[test]
    fn turnover_rate_is_never_derived() {
        let cur = analyze_head(&batch(&wavy(40)));
        assert!(cur.indicators.turnover_rate.is_none());
    }

    // ---- malformed ------------------------------------------------------

    #[test]
    fn malformed_bar_leaves_fields_unset() {
        let mut w = batch(&wavy(30));
        w[0].high = w[0].low - 1.0;
        w[0].indicators.rsi6 = Some(42.0);
        let mut cur = w[0].clone();
        let err = analyze(&mut cur, w.get(1), &w).unwrap_err();
        assert_eq!(err.trade_date, cur.trade_date);
        assert_eq!(cur.indicators, Indicators::default());
    }

    // ---- batch enrichment ----------------------------------------------

    #[test]
    fn enrichment_is_idempotent() {
        let mut first = batch(&wavy(60));
        enrich_new_bars(&mut first, 60);
        let mut second = first.clone();
        enrich_new_bars(&mut second, 60);
        assert_eq!(first, second);
    }

    #[test]
    fn later_bars_do_not_leak_into_earlier_ones() {
        let closes = wavy(60);
        let mut base = batch(&closes);
        enrich_new_bars(&mut base, 60);

        let mut altered_closes = closes.clone();
        *altered_closes.last_mut().unwrap() = 99.0;
        let mut altered = batch(&altered_closes);
        enrich_new_bars(&mut altered, 60);

        // index 0 is the newest bar; everything older must match exactly
        assert_ne!(base[0].indicators, altered[0].indicators);
        assert_eq!(&base[1..], &altered[1..]);
    }

    #[test]
    fn enrichment_feeds_dif_forward() {
        let mut bars = batch(&wavy(40));
        enrich_new_bars(&mut bars, 40);
        // bars 26.. from the oldest carry MACD; the newest sees 14 earlier DIFs
        let difs = bars.iter().filter(|b| b.indicators.macd_dif.is_some()).count();
        assert_eq!(difs, 15);
        assert!(bars[0].indicators.is_macd_golden_cross.is_some());
        assert!(bars[bars.len() - 26].indicators.is_macd_golden_cross.is_none());
    }

    #[test]
    fn only_new_bars_are_touched() {
        let mut bars = batch(&wavy(30));
        enrich_new_bars(&mut bars, 3);
        assert!(bars[..3].iter().all(|b| b.indicators.change_pct.is_some()));
        assert!(bars[3..].iter().all(|b| b.indicators == Indicators::default()));
    }

    #[test]
    fn history_tail_supplies_previous_for_oldest_new_bar() {
        let mut bars = batch(&[10.0, 11.0]);
        enrich_new_bars(&mut bars, 1);
        assert!((bars[0].indicators.change_pct.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(bars[1].indicators, Indicators::default());
    }

    #[test]
    fn malformed_bars_are_counted_not_dropped() {
        let mut bars = batch(&wavy(5));
        bars[2].low = bars[2].high + 1.0;
        assert_eq!(enrich_new_bars(&mut bars, 5), 1);
        assert_eq!(bars.len(), 5);
        assert!(bars[2].indicators.change_pct.is_none());
        assert!(bars[1].indicators.change_pct.is_some());
    }
}
