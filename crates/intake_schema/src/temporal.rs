//! Strict ISO-8601 date and date-time parsing.
//!
//! Only the ISO layouts are accepted: `YYYY-MM-DD` for dates and
//! `YYYY-MM-DD[T ]HH:MM[:SS[.ffffff]][Z|±HH[:MM]]` for date-times. Regional
//! layouts such as `05/31/2024` are rejected.

use crate::value::DateTimeValue;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<year>\d{4})-(?P<month>\d{1,2})-(?P<day>\d{1,2})$").expect("valid date regex")
});

static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<year>\d{4})-(?P<month>\d{1,2})-(?P<day>\d{1,2})[T ](?P<hour>\d{1,2}):(?P<minute>\d{1,2})(?::(?P<second>\d{1,2})(?:[\.,](?P<micro>\d{1,6})\d{0,6})?)?\s*(?P<tz>Z|[+-]\d{2}(?::?\d{2})?)?$",
    )
    .expect("valid datetime regex")
});

/// Parse a strict `YYYY-MM-DD` date. Surrounding whitespace is ignored.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let caps = DATE_RE.captures(raw.trim())?;
    let year: i32 = caps["year"].parse().ok()?;
    let month: u32 = caps["month"].parse().ok()?;
    let day: u32 = caps["day"].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse an ISO-8601 date-time. An explicit offset yields
/// [`DateTimeValue::Offset`], otherwise [`DateTimeValue::Naive`].
pub fn parse_iso_datetime(raw: &str) -> Option<DateTimeValue> {
    let caps = DATETIME_RE.captures(raw.trim())?;
    let date = NaiveDate::from_ymd_opt(
        caps["year"].parse().ok()?,
        caps["month"].parse().ok()?,
        caps["day"].parse().ok()?,
    )?;

    let second: u32 = match caps.name("second") {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    // Right-pad to microseconds: ".5" is 500000us.
    let micro: u32 = match caps.name("micro") {
        Some(m) => format!("{:0<6}", m.as_str()).parse().ok()?,
        None => 0,
    };
    let time = NaiveTime::from_hms_micro_opt(
        caps["hour"].parse().ok()?,
        caps["minute"].parse().ok()?,
        second,
        micro,
    )?;
    let naive = NaiveDateTime::new(date, time);

    match caps.name("tz") {
        None => Some(DateTimeValue::Naive(naive)),
        Some(tz) => {
            let offset = parse_offset(tz.as_str())?;
            let aware = offset.from_local_datetime(&naive).single()?;
            Some(DateTimeValue::Offset(aware))
        }
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    if raw == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let digits: String = raw[1..].chars().filter(|c| *c != ':').collect();
    let hours: i32 = digits.get(0..2)?.parse().ok()?;
    let minutes: i32 = match digits.get(2..4) {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_iso_date() {
        let d = parse_iso_date("2024-01-01").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 1, 1));
        assert!(parse_iso_date(" 2024-1-5 ").is_some());
        assert!(parse_iso_date("2024-02-30").is_none());
        assert!(parse_iso_date("01/15/2024").is_none());
        assert!(parse_iso_date("2024-01-01T10:00").is_none());
        assert!(parse_iso_date("").is_none());
    }

    #[test]
    fn test_parse_naive_datetime() {
        match parse_iso_datetime("2024-03-09 14:05").unwrap() {
            DateTimeValue::Naive(dt) => {
                assert_eq!(dt.hour(), 14);
                assert_eq!(dt.minute(), 5);
                assert_eq!(dt.second(), 0);
            }
            other => panic!("expected naive, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_fractional_seconds() {
        match parse_iso_datetime("2024-03-09T14:05:06.5").unwrap() {
            DateTimeValue::Naive(dt) => assert_eq!(dt.nanosecond(), 500_000_000),
            other => panic!("expected naive, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_offsets() {
        match parse_iso_datetime("2024-03-09T14:05:00Z").unwrap() {
            DateTimeValue::Offset(dt) => assert_eq!(dt.offset().local_minus_utc(), 0),
            other => panic!("expected offset, got {:?}", other),
        }
        match parse_iso_datetime("2024-03-09T14:05:00-0530").unwrap() {
            DateTimeValue::Offset(dt) => {
                assert_eq!(dt.offset().local_minus_utc(), -(5 * 3600 + 30 * 60))
            }
            other => panic!("expected offset, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_garbage_datetimes() {
        assert!(parse_iso_datetime("2024-03-09").is_none());
        assert!(parse_iso_datetime("2024-03-09T25:00").is_none());
        assert!(parse_iso_datetime("yesterday").is_none());
        assert!(parse_iso_datetime("2024-03-09T10:00+02:75").is_none());
    }

    #[test]
    fn test_datetime_iso_roundtrip() {
        let parsed = parse_iso_datetime("2024-03-09T14:05:00+02:00").unwrap();
        assert_eq!(parsed.to_iso_string(), "2024-03-09T14:05:00+02:00");
        let naive = parse_iso_datetime("2024-03-09T14:05:00").unwrap();
        assert_eq!(naive.to_iso_string(), "2024-03-09T14:05:00");
    }
}
