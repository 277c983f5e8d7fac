// =============================================================================
// Exchange-segment classification for A-share codes
// =============================================================================
//
//   60xxxx, 688xxx            -> sh   (main board, STAR market)
//   000xxx - 103xxx           -> sz   (main board, SME board)
//   300xxx - 309xxx           -> sz   (ChiNext)
//   83xxxx, 87xxxx, 88xxxx, 89xxxx -> bj
//
// Anything else is not a tradable equity code and is skipped before it ever
// reaches the sync pipeline.
// =============================================================================

use crate::types::Exchange;

const BJ_PREFIXES: [u32; 4] = [83, 87, 88, 89];

/// Map a six-digit code to its exchange segment.
pub fn classify(code: &str) -> Option<Exchange> {
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let p2: u32 = code[..2].parse().ok()?;
    let p3: u32 = code[..3].parse().ok()?;

    if p2 == 60 || p3 == 688 {
        Some(Exchange::Shanghai)
    } else if p3 <= 103 || (300..=309).contains(&p3) {
        Some(Exchange::Shenzhen)
    } else if BJ_PREFIXES.contains(&p2) {
        Some(Exchange::Beijing)
    } else {
        None
    }
}

/// Provider symbol (`sz000001`) for a numeric code, if it is tradable.
pub fn symbol_for(code: u32) -> Option<String> {
    let padded = format!("{code:06}");
    classify(&padded).map(|ex| format!("{}{padded}", ex.prefix()))
}

/// Code ranges walked when the provider's listing endpoint is unavailable.
const UNIVERSE_RANGES: [(u32, u32); 7] = [
    (600_000, 605_999),
    (607_000, 609_999),
    (688_000, 688_999),
    (0, 3_999),
    (100_000, 103_999),
    (300_000, 309_999),
    (4_000, 99_999),
];

/// Every classifiable symbol in the known code ranges, Shanghai first, then
/// Shenzhen, then Beijing.
pub fn universe() -> impl Iterator<Item = String> {
    let bj = BJ_PREFIXES.iter().map(|p| (p * 10_000, p * 10_000 + 9_999));
    UNIVERSE_RANGES
        .into_iter()
        .chain(bj)
        .flat_map(|(start, end)| start..=end)
        .filter_map(symbol_for)
}
