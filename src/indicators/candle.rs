// =============================================================================
// Candle Pattern Classification
// =============================================================================
//
// Classifies a single bar's body and shadows relative to its high-low range.
//
//   range = high - low            body = |close - open|
//   body / range < 5%            => Doji
//   close > open                 => Bullish, otherwise Bearish
//
// Hammer:           lower shadow > 2 * body, upper shadow < body, body < 20%
// Inverted hammer:  upper shadow > 2 * body, lower shadow < body, body < 20%
// =============================================================================

use crate::types::KlineType;

const DOJI_BODY_FRACTION: f64 = 0.05;
const HAMMER_MAX_BODY_PCT: f64 = 20.0;

/// Shape of one candle. Ratios are percentages of the high-low range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleShape {
    pub kline_type: KlineType,
    pub upper_shadow_ratio: f64,
    pub lower_shadow_ratio: f64,
    pub body_ratio: f64,
    pub is_hammer: bool,
    pub is_inverted_hammer: bool,
}

impl CandleShape {
    pub fn is_doji(&self) -> bool {
        self.kline_type == KlineType::Doji
    }
}

/// Classify a candle. Returns `None` when the range is not positive (a
/// suspended or limit-locked day where open = high = low = close).
pub fn classify(open: f64, high: f64, low: f64, close: f64) -> Option<CandleShape> {
    let range = high - low;
    if !(range > 0.0) {
        return None;
    }

    let body = (close - open).abs();
    let kline_type = if body / range < DOJI_BODY_FRACTION {
        KlineType::Doji
    } else if close > open {
        KlineType::Bullish
    } else {
        KlineType::Bearish
    };

    let upper_shadow = high - open.max(close);
    let lower_shadow = open.min(close) - low;
    let body_ratio = body / range * 100.0;

    Some(CandleShape {
        kline_type,
        upper_shadow_ratio: upper_shadow / range * 100.0,
        lower_shadow_ratio: lower_shadow / range * 100.0,
        body_ratio,
        is_hammer: lower_shadow > body * 2.0
            && upper_shadow < body
            && body_ratio < HAMMER_MAX_BODY_PCT,
        is_inverted_hammer: upper_shadow > body * 2.0
            && lower_shadow < body
            && body_ratio < HAMMER_MAX_BODY_PCT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_body_is_doji() {
        let shape = classify(10.0, 11.0, 9.0, 10.01).unwrap();
        assert_eq!(shape.kline_type, KlineType::Doji);
        assert!(shape.is_doji());
    }

    #[test]
    fn bullish_and_bearish_bodies() {
        let up = classify(10.0, 11.5, 9.5, 11.0).unwrap();
        assert_eq!(up.kline_type, KlineType::Bullish);
        assert!((up.body_ratio - 50.0).abs() < 1e-10);
        assert!((up.upper_shadow_ratio - 25.0).abs() < 1e-10);
        assert!((up.lower_shadow_ratio - 25.0).abs() < 1e-10);

        let down = classify(11.0, 11.5, 9.5, 10.0).unwrap();
        assert_eq!(down.kline_type, KlineType::Bearish);
    }

    #[test]
    fn zero_range_is_skipped() {
        assert!(classify(10.0, 10.0, 10.0, 10.0).is_none());
    }

    #[test]
    fn hammer_shape() {
        // range 10, body 1 (10%), lower shadow 8, upper shadow 0.5
        let shape = classify(18.5, 20.0, 10.0, 19.5).unwrap();
        assert!(shape.is_hammer);
        assert!(!shape.is_inverted_hammer);
    }

    #[test]
    fn inverted_hammer_shape() {
        // range 10, body 1, upper shadow 8, lower shadow 0.5
        let shape = classify(10.5, 20.0, 10.0, 11.5).unwrap();
        assert!(shape.is_inverted_hammer);
        assert!(!shape.is_hammer);
    }
}
