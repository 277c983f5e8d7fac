// =============================================================================
// Moving-Average Crosses & Alignment
// =============================================================================
//
// Works on the rolling averages the provider publishes with every bar
// (`ma_price5`, `ma_price10`, `ma_price30`). A zero average means the provider
// did not have enough history yet, so every check requires strictly positive
// inputs.
//
//   golden cross:  prev.fast <= prev.slow  &&  cur.fast > cur.slow
//   death cross:   prev.fast >= prev.slow  &&  cur.fast < cur.slow
//   bullish:       ma5 > ma10 > ma30
//   bearish:       ma5 < ma10 < ma30
// =============================================================================

use crate::types::Bar;

/// Golden / death cross flags for one pair of averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cross {
    pub golden: bool,
    pub death: bool,
}

/// Cross of `fast` over `slow` between two consecutive observations.
///
/// Returns `None` unless all four values are strictly positive.
pub fn detect_cross(prev_fast: f64, prev_slow: f64, fast: f64, slow: f64) -> Option<Cross> {
    if !(prev_fast > 0.0 && prev_slow > 0.0 && fast > 0.0 && slow > 0.0) {
        return None;
    }
    Some(Cross {
        golden: prev_fast <= prev_slow && fast > slow,
        death: prev_fast >= prev_slow && fast < slow,
    })
}

/// MA5/MA10 cross between `previous` and `current`.
pub fn ma5_cross(previous: &Bar, current: &Bar) -> Option<Cross> {
    detect_cross(
        previous.ma_price5,
        previous.ma_price10,
        current.ma_price5,
        current.ma_price10,
    )
}

/// MA10/MA30 cross between `previous` and `current`.
pub fn ma10_cross(previous: &Bar, current: &Bar) -> Option<Cross> {
    detect_cross(
        previous.ma_price10,
        previous.ma_price30,
        current.ma_price10,
        current.ma_price30,
    )
}

/// `(bullish, bearish)` alignment of the three averages on one bar.
pub fn alignment(bar: &Bar) -> Option<(bool, bool)> {
    let (ma5, ma10, ma30) = (bar.ma_price5, bar.ma_price10, bar.ma_price30);
    if !(ma5 > 0.0 && ma10 > 0.0 && ma30 > 0.0) {
        return None;
    }
    Some((ma5 > ma10 && ma10 > ma30, ma5 < ma10 && ma10 < ma30))
}
