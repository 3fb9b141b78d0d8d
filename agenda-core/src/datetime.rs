//! Canonical date/time resolution.
//!
//! Turns the raw `date`/`time` strings a caller supplies into a local instant.
//! Attempts run in order and the first success wins:
//!
//! 1. The combined `"<date> <time>"` string against a set of common free-form layouts.
//! 2. A `month/day/year` date plus an `H:MM [AM|PM]` time, composed from local
//!    calendar fields with overflow carried forward (month 13 is January of the next year,
//!    minute 75 is 1:15 past the hour).
//!
//! Years are taken literally in both paths: `3/10/25` is the year 25, not 2025.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AgendaError, AgendaResult};

static TIME_OF_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,2}):(\d{2})(?:\s*(AM|PM))?\s*$").expect("valid time-of-day regex")
});

/// Layouts tried against the combined `"<date> <time>"` string, interpreted as local time.
const LOCAL_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %I:%M %p",
    "%Y-%m-%d %I:%M%p",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M%p",
    "%B %d, %Y %H:%M",
    "%B %d, %Y %I:%M %p",
    "%b %d, %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%d %B %Y %H:%M",
    "%d %b %Y %H:%M",
];

/// Slash layouts with the year first. Only tried when the date starts with four digits,
/// so `3/10/25` stays month/day/year.
const YEAR_FIRST_LAYOUTS: &[&str] = &["%Y/%m/%d %H:%M", "%Y/%m/%d %I:%M %p"];

/// Layouts that carry their own UTC offset.
const ZONED_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M %z",
    "%Y-%m-%d %H:%M:%S %z",
];

/// Layouts accepted for a standalone instant (e.g. an occurrence anchor).
const STANDALONE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// A parsed `H:MM [AM|PM]` time of day, after 12-hour conversion.
///
/// Values are not range-checked; out-of-range hours and minutes roll over when
/// composed into an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

/// Resolve a `(date, time)` pair into a local instant.
pub fn resolve(date: &str, time: &str) -> AgendaResult<DateTime<Local>> {
    let combined = format!("{} {}", date.trim(), time.trim());

    if let Some(instant) = parse_free_form(date.trim(), &combined) {
        return Ok(instant);
    }

    if let Some(instant) = parse_slash_date(date, time) {
        return Ok(instant);
    }

    Err(AgendaError::Parse {
        date: date.to_string(),
        time: time.to_string(),
    })
}

/// Parse `H:MM` with an optional `AM`/`PM` suffix (case-insensitive).
pub fn parse_time_of_day(time: &str) -> Option<TimeOfDay> {
    let caps = TIME_OF_DAY_RE.captures(time)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;

    if let Some(suffix) = caps.get(3) {
        let pm = suffix.as_str().eq_ignore_ascii_case("pm");
        if pm && hour < 12 {
            hour += 12;
        }
        if !pm && hour == 12 {
            hour = 0;
        }
    }

    Some(TimeOfDay { hour, minute })
}

/// Parse a standalone instant: RFC 3339, a local date-time, or a bare date
/// (local midnight).
pub fn parse_instant(value: &str) -> AgendaResult<DateTime<Local>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Local));
    }

    let standalone = STANDALONE_LAYOUTS
        .iter()
        .filter_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
        .find_map(local_instant);
    if let Some(instant) = standalone {
        return Ok(instant);
    }

    let midnight = ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .filter_map(|layout| NaiveDate::parse_from_str(value, layout).ok())
        .filter_map(|date| date.and_hms_opt(0, 0, 0))
        .find_map(local_instant);
    if let Some(instant) = midnight {
        return Ok(instant);
    }

    Err(AgendaError::Parse {
        date: value.to_string(),
        time: String::new(),
    })
}

fn parse_free_form(date: &str, combined: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(combined) {
        return Some(dt.with_timezone(&Local));
    }

    for layout in ZONED_LAYOUTS {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(combined, layout) {
            return Some(dt.with_timezone(&Local));
        }
    }

    let year_first: &[&str] = if leads_with_year(date) {
        YEAR_FIRST_LAYOUTS
    } else {
        &[]
    };

    LOCAL_LAYOUTS
        .iter()
        .chain(year_first)
        .filter_map(|layout| NaiveDateTime::parse_from_str(combined, layout).ok())
        .find_map(local_instant)
}

fn leads_with_year(date: &str) -> bool {
    date.split('/')
        .next()
        .is_some_and(|lead| lead.len() == 4 && lead.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_slash_date(date: &str, time: &str) -> Option<DateTime<Local>> {
    let parts: Vec<&str> = date.split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let mut fields = [0i64; 3];
    for (field, part) in fields.iter_mut().zip(&parts) {
        *field = part.trim().parse().ok()?;
    }
    let [month, day, year] = fields;

    let tod = parse_time_of_day(time)?;
    compose_local(year, month, day, tod.hour.into(), tod.minute.into())
}

/// Build an instant from local calendar fields, carrying overflow into the
/// next larger unit instead of rejecting it.
fn compose_local(year: i64, month: i64, day: i64, hour: i64, minute: i64) -> Option<DateTime<Local>> {
    let total_months = year.checked_mul(12)?.checked_add(month - 1)?;
    let year = i32::try_from(total_months.div_euclid(12)).ok()?;
    let month0 = u32::try_from(total_months.rem_euclid(12)).ok()?;

    let naive = NaiveDate::from_ymd_opt(year, month0 + 1, 1)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::try_days(day - 1)?)?
        .checked_add_signed(TimeDelta::try_hours(hour)?)?
        .checked_add_signed(TimeDelta::try_minutes(minute)?)?;

    local_instant(naive)
}

/// Attach the host's local offset. Ambiguous wall-clock times take the earlier
/// instant; times skipped by a DST jump move forward by an hour.
pub(crate) fn local_instant(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            let shifted = naive.checked_add_signed(TimeDelta::try_hours(1)?)?;
            Local.from_local_datetime(&shifted).earliest()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn fields(dt: DateTime<Local>) -> (i32, u32, u32, u32, u32) {
        (dt.year(), dt.month(), dt.day(), dt.hour(), dt.minute())
    }

    #[test]
    fn test_resolve_iso_date_and_24h_time() {
        let dt = resolve("2025-03-10", "09:00").unwrap();
        assert_eq!(fields(dt), (2025, 3, 10, 9, 0));
    }

    #[test]
    fn test_resolve_iso_date_with_meridiem() {
        let dt = resolve("2025-03-10", "9:30 PM").unwrap();
        assert_eq!(fields(dt), (2025, 3, 10, 21, 30));
    }

    #[test]
    fn test_resolve_us_date() {
        let dt = resolve("12/24/2025", "7:05 am").unwrap();
        assert_eq!(fields(dt), (2025, 12, 24, 7, 5));
    }

    #[test]
    fn test_resolve_rolls_over_out_of_range_fields() {
        let dt = resolve("13/1/2025", "10:75").unwrap();
        assert_eq!(fields(dt), (2026, 1, 1, 11, 15));

        let dt = resolve("1/1/2025", "24:00").unwrap();
        assert_eq!(fields(dt), (2025, 1, 2, 0, 0));
    }

    #[test]
    fn test_resolve_keeps_two_digit_year_literal() {
        let dt = resolve("3/10/25", "9:00").unwrap();
        assert_eq!(fields(dt), (25, 3, 10, 9, 0));

        let dt = resolve("1/2/03", "9:00").unwrap();
        assert_eq!(fields(dt), (3, 1, 2, 9, 0));
    }

    #[test]
    fn test_resolve_year_first_slash_date() {
        let dt = resolve("2025/03/10", "09:00").unwrap();
        assert_eq!(fields(dt), (2025, 3, 10, 9, 0));
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        let err = resolve("next tuesday", "noon").unwrap_err();
        assert_eq!(
            err,
            AgendaError::Parse {
                date: "next tuesday".into(),
                time: "noon".into()
            }
        );
    }

    #[test]
    fn test_resolve_rejects_slash_date_with_bad_time() {
        assert!(resolve("3/10/2025", "soon").is_err());
        assert!(resolve("3/x/2025", "9:00").is_err());
        assert!(resolve("3/10", "9:00").is_err());
    }

    #[test]
    fn test_time_of_day_meridiem_conversion() {
        assert_eq!(parse_time_of_day("12:00 AM"), Some(TimeOfDay { hour: 0, minute: 0 }));
        assert_eq!(parse_time_of_day("12:15pm"), Some(TimeOfDay { hour: 12, minute: 15 }));
        assert_eq!(parse_time_of_day(" 1:05 PM "), Some(TimeOfDay { hour: 13, minute: 5 }));
        assert_eq!(parse_time_of_day("11:59 am"), Some(TimeOfDay { hour: 11, minute: 59 }));
        assert_eq!(parse_time_of_day("99:99"), Some(TimeOfDay { hour: 99, minute: 99 }));
        assert_eq!(parse_time_of_day("9"), None);
    }

    #[test]
    fn test_resolve_round_trips_supported_formats() {
        let cases = [
            ("2025-01-31", "23:59", "%Y-%m-%d", "%H:%M"),
            ("2024-02-29", "00:00", "%Y-%m-%d", "%H:%M"),
            ("07/04/2025", "06:45 PM", "%m/%d/%Y", "%I:%M %p"),
            ("11/30/2030", "12:00 AM", "%m/%d/%Y", "%I:%M %p"),
        ];
        for (date, time, date_fmt, time_fmt) in cases {
            let dt = resolve(date, time).unwrap();
            assert_eq!(dt.format(date_fmt).to_string(), date, "date for {date} {time}");
            assert_eq!(dt.format(time_fmt).to_string(), time, "time for {date} {time}");
        }

        let short_years = [
            ("3/10/25", "9:00", (25, 3, 10)),
            ("1/2/03", "12:30 PM", (3, 1, 2)),
            ("12/31/99", "11:59 PM", (99, 12, 31)),
        ];
        for (date, time, (year, month, day)) in short_years {
            let dt = resolve(date, time).unwrap();
            assert_eq!((dt.year(), dt.month(), dt.day()), (year, month, day), "{date} {time}");
            assert_eq!(resolve(date, time).unwrap(), dt, "{date} {time}");
        }
    }

    #[test]
    fn test_parse_instant_forms() {
        let midnight = parse_instant("2025-01-01").unwrap();
        assert_eq!(fields(midnight), (2025, 1, 1, 0, 0));

        let local = parse_instant("2025-01-01T08:30").unwrap();
        assert_eq!(fields(local), (2025, 1, 1, 8, 30));

        let utc = parse_instant("2025-01-01T00:00:00Z").unwrap();
        assert_eq!(utc.timestamp(), 1_735_689_600);

        assert!(parse_instant("whenever").is_err());
    }
}
