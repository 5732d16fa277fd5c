//! Five-field cron expressions.
//!
//! Grammar per field: `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S` and comma lists
//! of those. Fields are minute (0-59), hour (0-23), day of month (1-31),
//! month (1-12) and day of week (0-7, both 0 and 7 are Sunday).
//!
//! When both day fields are restricted a day matches if *either* matches;
//! when one of them starts with `*` both must match. All evaluation is UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use thiserror::Error;

/// Years searched ahead before a schedule is declared unsatisfiable.
const SEARCH_YEARS: i32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_star: bool,
    dow_star: bool,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7 };

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week | 1) & !(1 << 7);
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field(fields[0], &MINUTE)?,
            hours: parse_field(fields[1], &HOUR)?,
            days_of_month: parse_field(fields[2], &DAY_OF_MONTH)?,
            months: parse_field(fields[3], &MONTH)?,
            days_of_week,
            dom_star: fields[2].starts_with('*'),
            dow_star: fields[4].starts_with('*'),
        })
    }

    /// Whether `at` (truncated to the minute) is a fire time.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        let t = at.naive_utc();
        bit(self.months, t.month())
            && self.day_matches(t.date())
            && bit(self.hours, t.hour())
            && bit(self.minutes, t.minute())
    }

    /// First fire time strictly after `after`, or `None` when the expression
    /// cannot be satisfied (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc();
        let mut t = start
            .date()
            .and_hms_opt(start.hour(), start.minute(), 0)?
            + Duration::minutes(1);
        let horizon = t.year() + SEARCH_YEARS;

        loop {
            if t.year() > horizon {
                return None;
            }
            if !bit(self.months, t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !bit(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !bit(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = bit(self.days_of_month, date.day());
        let dow = bit(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_star || self.dow_star {
            dom && dow
        } else {
            dom || dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn bit(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_field(text: &str, spec: &FieldSpec) -> Result<u64, CronError> {
    let invalid = |reason: String| CronError::InvalidField {
        field: spec.name,
        value: text.to_string(),
        reason,
    };

    let mut mask = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("step '{step}' is not a number")))?;
                if step == 0 {
                    return Err(invalid("step must be at least 1".to_string()));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (number(a, spec, &invalid)?, number(b, spec, &invalid)?)
        } else {
            let n = number(range, spec, &invalid)?;
            // `N/S` runs from N to the end of the field.
            (n, if step.is_some() { spec.max } else { n })
        };

        if lo > hi {
            return Err(invalid(format!("range {lo}-{hi} is reversed")));
        }

        let step = step.unwrap_or(1) as usize;
        for value in (lo..=hi).step_by(step) {
            mask |= 1u64 << value;
        }
    }

    Ok(mask)
}

fn number(
    text: &str,
    spec: &FieldSpec,
    invalid: &dyn Fn(String) -> CronError,
) -> Result<u32, CronError> {
    let n: u32 = text
        .parse()
        .map_err(|_| invalid(format!("'{text}' is not a number")))?;
    if n < spec.min || n > spec.max {
        return Err(invalid(format!(
            "{n} is outside {}-{}",
            spec.min, spec.max
        )));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn next(expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        CronSchedule::parse(expr).unwrap().next_after(after)
    }

    #[test]
    fn test_every_minute_is_strictly_after() {
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
        assert_eq!(next("*/1 * * * *", after), Some(at(2024, 1, 1, 10, 1)));
        assert_eq!(next("* * * * *", at(2024, 1, 1, 10, 0)), Some(at(2024, 1, 1, 10, 1)));
    }

    #[test]
    fn test_daily_rolls_to_next_day() {
        assert_eq!(next("0 2 * * *", at(2024, 1, 1, 2, 0)), Some(at(2024, 1, 2, 2, 0)));
        assert_eq!(next("0 2 * * *", at(2024, 12, 31, 3, 0)), Some(at(2025, 1, 1, 2, 0)));
    }

    #[test]
    fn test_weekday_range() {
        // 2024-01-06 is a Saturday.
        assert_eq!(
            next("30 9 * * 1-5", at(2024, 1, 6, 12, 0)),
            Some(at(2024, 1, 8, 9, 30))
        );
    }

    #[test]
    fn test_sunday_as_seven() {
        let a = CronSchedule::parse("0 0 * * 7").unwrap();
        let b = CronSchedule::parse("0 0 * * 0").unwrap();
        let after = at(2024, 1, 1, 0, 0);
        assert_eq!(a.next_after(after), Some(at(2024, 1, 7, 0, 0)));
        assert_eq!(a.next_after(after), b.next_after(after));
    }

    #[test]
    fn test_restricted_day_fields_are_ored() {
        // Either the 13th or a Friday; 2024-01-05 is the first Friday.
        assert_eq!(next("0 0 13 * 5", at(2024, 1, 1, 0, 0)), Some(at(2024, 1, 5, 0, 0)));
        // Star-prefixed day-of-week keeps the AND rule.
        assert_eq!(next("0 0 13 * *", at(2024, 1, 1, 0, 0)), Some(at(2024, 1, 13, 0, 0)));
    }

    #[test]
    fn test_lists_and_stepped_ranges() {
        let s = CronSchedule::parse("0-30/10 1,13 * * *").unwrap();
        assert!(s.matches(at(2024, 5, 5, 13, 20)));
        assert!(s.matches(at(2024, 5, 5, 1, 0)));
        assert!(!s.matches(at(2024, 5, 5, 13, 40)));
        assert!(!s.matches(at(2024, 5, 5, 2, 0)));
    }

    #[test]
    fn test_leap_day_and_impossible_dates() {
        assert_eq!(next("0 0 29 2 *", at(2024, 3, 1, 0, 0)), Some(at(2028, 2, 29, 0, 0)));
        assert_eq!(next("0 0 30 2 *", at(2024, 1, 1, 0, 0)), None);
    }

    #[test]
    fn test_malformed_expressions() {
        assert_eq!(CronSchedule::parse("* * * *"), Err(CronError::FieldCount(4)));
        assert!(CronSchedule::parse("60 * * * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("5-1 * * * *").is_err());
        assert!(CronSchedule::parse("a * * * *").is_err());
        assert!(CronSchedule::parse("* * 0 * *").is_err());
        assert!(CronSchedule::parse("* * * 13 *").is_err());
        assert!(CronSchedule::parse("* * * * 8").is_err());

        let err = CronSchedule::parse("* 24 * * *").unwrap_err();
        assert!(err.to_string().contains("hour"));
    }

    #[test]
    fn test_display_normalizes_whitespace() {
        let s: CronSchedule = "0  2 *  * *".parse().unwrap();
        assert_eq!(s.to_string(), "0 2 * * *");
    }

    fn expression() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["*", "*/5", "0", "15,45", "0-30/10", "7/20"]),
            prop::sample::select(vec!["*", "*/6", "2", "9-17", "0,12"]),
            prop::sample::select(vec!["*", "1", "1-15", "*/7", "10,20"]),
            prop::sample::select(vec!["*", "1,6", "*/3", "2-11"]),
            prop::sample::select(vec!["*", "1-5", "0", "6,7", "*/2"]),
        )
            .prop_map(|(m, h, dom, mon, dow)| format!("{m} {h} {dom} {mon} {dow}"))
    }

    proptest! {
        #[test]
        fn prop_next_fire_matches_and_is_after(
            expr in expression(),
            secs in 1_600_000_000i64..1_900_000_000i64,
        ) {
            let schedule = CronSchedule::parse(&expr).unwrap();
            let after = Utc.timestamp_opt(secs, 0).unwrap();
            let fire = schedule.next_after(after).unwrap();

            prop_assert!(fire > after);
            prop_assert_eq!(fire.second(), 0);
            prop_assert!(schedule.matches(fire));
            prop_assert!(fire - after <= Duration::days(366 * i64::from(SEARCH_YEARS)));
        }
    }
}
