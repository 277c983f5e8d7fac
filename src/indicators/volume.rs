// =============================================================================
// Volume Analysis
// =============================================================================
//
//   ratio = volume / ma_volume5
//   surge:  ratio > 1.5        shrink: ratio < 0.5
//   price-volume match: (up day && ratio > 1.2) || (down day && ratio < 0.8)

pub const SURGE_RATIO: f64 = 1.5;
pub const SHRINK_RATIO: f64 = 0.5;
const MATCH_UP_RATIO: f64 = 1.2;
const MATCH_DOWN_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSignal {
    pub ratio: f64,
    pub is_surge: bool,
    pub is_shrink: bool,
}

/// Volume relative to the provider's 5-day average. `None` when the average
/// is zero.
pub fn volume_signal(volume: u64, ma_volume5: u64) -> Option<VolumeSignal> {
    if ma_volume5 == 0 {
        return None;
    }
    let ratio = volume as f64 / ma_volume5 as f64;
    Some(VolumeSignal {
        ratio,
        is_surge: ratio > SURGE_RATIO,
        is_shrink: ratio < SHRINK_RATIO,
    })
}

/// Rising price on expanding volume, or falling price on contracting volume.
pub fn price_volume_match(change_pct: f64, ratio: f64) -> bool {
    (change_pct > 0.0 && ratio > MATCH_UP_RATIO) || (change_pct < 0.0 && ratio < MATCH_DOWN_RATIO)
}
