// =============================================================================
// Trading calendar helpers
// =============================================================================
//
// Only weekends are treated as non-trading days. Exchange holidays are not
// modelled; the incremental overlap window absorbs them.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// Most recent weekday on or before `today` (Saturday/Sunday roll back to
/// Friday).
pub fn last_trading_day(today: NaiveDate) -> NaiveDate {
    match today.weekday() {
        Weekday::Sat => today - Duration::days(1),
        Weekday::Sun => today - Duration::days(2),
        _ => today,
    }
}

/// Number of bars to request from the provider.
///
/// A full sync asks for `max_bars`. An incremental sync covers
/// `today - (cursor - overlap_days)` calendar days so a few missed trading
/// days are re-fetched, clamped to `1..=max_bars`.
pub fn fetch_window(today: NaiveDate, cursor: Option<NaiveDate>, overlap_days: i64, max_bars: usize) -> usize {
    let Some(cursor) = cursor else {
        return max_bars;
    };
    let from = cursor - Duration::days(overlap_days);
    let days = (today - from).num_days().max(1);
    usize::try_from(days).unwrap_or(max_bars).min(max_bars)
}

/// Next occurrence of `hour:minute` strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    let at = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = now.date().and_time(at);
    if today > now {
        Some(today)
    } else {
        Some((now.date() + Duration::days(1)).and_time(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekend_rolls_back_to_friday() {
        // 2024-06-07 is a Friday
        assert_eq!(last_trading_day(date(2024, 6, 7)), date(2024, 6, 7));
        assert_eq!(last_trading_day(date(2024, 6, 8)), date(2024, 6, 7));
        assert_eq!(last_trading_day(date(2024, 6, 9)), date(2024, 6, 7));
        assert_eq!(last_trading_day(date(2024, 6, 10)), date(2024, 6, 10));
    }

    #[test]
    fn full_sync_requests_maximum() {
        assert_eq!(fetch_window(date(2024, 6, 10), None, 10, 70_000), 70_000);
    }

    #[test]
    fn incremental_window_includes_overlap() {
        // cursor 06-05, overlap 10 -> from 05-26 -> 15 days to 06-10
        let n = fetch_window(date(2024, 6, 10), Some(date(2024, 6, 5)), 10, 70_000);
        assert_eq!(n, 15);
    }

    #[test]
    fn incremental_window_is_clamped() {
        let n = fetch_window(date(2024, 6, 10), Some(date(2000, 1, 1)), 10, 500);
        assert_eq!(n, 500);
        // cursor in the future still asks for at least one bar
        let n = fetch_window(date(2024, 6, 10), Some(date(2024, 7, 1)), 10, 500);
        assert_eq!(n, 1);
    }

    #[test]
    fn next_run_is_today_or_tomorrow() {
        let morning = date(2024, 6, 10).and_hms_opt(6, 0, 0).unwrap();
        assert_eq!(
            next_run_after(morning, 7, 20),
            Some(date(2024, 6, 10).and_hms_opt(7, 20, 0).unwrap())
        );
        let exactly = date(2024, 6, 10).and_hms_opt(7, 20, 0).unwrap();
        assert_eq!(
            next_run_after(exactly, 7, 20),
            Some(date(2024, 6, 11).and_hms_opt(7, 20, 0).unwrap())
        );
        assert_eq!(next_run_after(morning, 25, 0), None);
    }
}
