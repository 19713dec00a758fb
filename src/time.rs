//! Local-time helpers for "today" and the posting window.
//!
//! The local zone is a fixed UTC offset (JST, +09:00 by default). Daylight
//! saving is not modelled.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use std::ops::Range;

pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

pub fn fixed_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
}

pub fn local_date(instant: DateTime<Utc>, tz: &FixedOffset) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

pub fn local_hour(instant: DateTime<Utc>, tz: &FixedOffset) -> u32 {
    instant.with_timezone(tz).hour()
}

pub fn format_local_hm(instant: DateTime<Utc>, tz: &FixedOffset) -> String {
    instant.with_timezone(tz).format("%H:%M").to_string()
}

/// Half-open UTC range covering local hours `start_hour..=end_hour` of `date`.
///
/// The end bound is the top of the hour after `end_hour`, so `(5, 9)` covers
/// 05:00 up to but excluding 10:00 local time. An `end_hour` of 23 ends at
/// midnight of the following day.
pub fn local_window_to_utc_range(
    date: NaiveDate,
    start_hour: u32,
    end_hour: u32,
    tz: &FixedOffset,
) -> Range<DateTime<Utc>> {
    let midnight = date.and_time(chrono::NaiveTime::default());
    let local_start = midnight + Duration::hours(i64::from(start_hour));
    let local_end = midnight + Duration::hours(i64::from(end_hour) + 1);

    // A fixed offset has no gaps or folds, so the naive-minus-offset shift is exact.
    let offset = Duration::seconds(i64::from(tz.local_minus_utc()));
    let start = (local_start - offset).and_utc();
    let end = (local_end - offset).and_utc();
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jst() -> FixedOffset {
        fixed_offset(DEFAULT_UTC_OFFSET_HOURS).unwrap()
    }

    #[test]
    fn test_local_date_rolls_over_before_utc() {
        // 2026-02-09 15:30 UTC is 2026-02-10 00:30 JST
        let instant = Utc.with_ymd_and_hms(2026, 2, 9, 15, 30, 0).unwrap();
        assert_eq!(
            local_date(instant, &jst()),
            NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
        );
        assert_eq!(local_date(instant, &jst()).to_string(), "2026-02-10");
        assert_eq!(local_hour(instant, &jst()), 0);
    }

    #[test]
    fn test_local_hour_and_format() {
        let instant = Utc.with_ymd_and_hms(2026, 2, 9, 21, 31, 0).unwrap();
        assert_eq!(local_hour(instant, &jst()), 6);
        assert_eq!(format_local_hm(instant, &jst()), "06:31");
    }

    #[test]
    fn test_window_to_utc_range() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let range = local_window_to_utc_range(date, 5, 9, &jst());
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 2, 9, 20, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2026, 2, 10, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_window_ending_at_last_hour_crosses_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let range = local_window_to_utc_range(date, 0, 23, &jst());
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 2, 9, 15, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2026, 2, 10, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_window_in_utc_zone() {
        let utc = fixed_offset(0).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let range = local_window_to_utc_range(date, 6, 6, &utc);
        assert_eq!(range.end - range.start, Duration::hours(1));
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 2, 10, 6, 0, 0).unwrap());
    }
}
