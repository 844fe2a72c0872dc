//! Business-day arithmetic in East Africa Time (UTC+3, no DST).

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

pub const EAT_OFFSET_SECONDS: i32 = 3 * 3600;

pub fn eat() -> FixedOffset {
    FixedOffset::east_opt(EAT_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix())
}

/// Calendar date in EAT at `now`.
pub fn today_eat(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&eat()).date_naive()
}

/// First and last millisecond of the EAT day containing `now`, as UTC instants.
pub fn today_range_eat(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = today_eat(now).and_time(NaiveTime::MIN);
    let start = Utc.from_utc_datetime(&(midnight - Duration::seconds(EAT_OFFSET_SECONDS.into())));
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

/// The window of equal length ending where `[from, to]` starts.
pub fn previous_period(from: DateTime<Utc>, to: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let span = to - from;
    (from - span, to - span)
}

/// `YYYYMMDDHHmmss` in EAT, as Daraja expects.
pub fn mpesa_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&eat()).format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn today_range_follows_eat_midnight() {
        // 22:30 UTC is already the next day in Nairobi.
        let (start, end) = today_range_eat(utc("2024-03-10T22:30:00Z"));
        assert_eq!(start, utc("2024-03-10T21:00:00Z"));
        assert_eq!(end, utc("2024-03-11T20:59:59.999Z"));

        let (start, _) = today_range_eat(utc("2024-03-10T20:59:59Z"));
        assert_eq!(start, utc("2024-03-09T21:00:00Z"));
    }

    #[test]
    fn previous_period_has_same_length() {
        let from = utc("2024-03-08T00:00:00Z");
        let to = utc("2024-03-10T00:00:00Z");
        let (prev_from, prev_to) = previous_period(from, to);
        assert_eq!(prev_from, utc("2024-03-06T00:00:00Z"));
        assert_eq!(prev_to, from);
    }

    #[test]
    fn timestamp_is_local() {
        assert_eq!(mpesa_timestamp(utc("2024-01-31T21:05:09Z")), "20240201000509");
    }

    #[test]
    fn today_eat_rolls_over_at_21_utc() {
        assert_eq!(
            today_eat(utc("2024-12-31T21:00:00Z")),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
    }
}
