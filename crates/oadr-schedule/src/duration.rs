use std::sync::OnceLock;

use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use regex::Regex;

use crate::ScheduleError;

/// `[+|-]P[nY][nMo][nW][nD][T[nH][nM][nS]]`
///
/// Years and months are kept separate from the fixed-length fields
/// because they must be applied as calendar-relative offsets (a month is
/// not a fixed number of seconds) — see `durations_to_dates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarDuration {
    pub negative: bool,
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl CalendarDuration {
    /// The "unending interval" sentinel: a zero-valued duration after the
    /// first marks the prior interval as open-ended.
    pub fn is_zero(&self) -> bool {
        self.years == 0
            && self.months == 0
            && self.weeks == 0
            && self.days == 0
            && self.hours == 0
            && self.minutes == 0
            && self.seconds == 0
    }

    /// Whole-seconds length of everything but the calendar-relative
    /// (year/month) fields. Used by `random_offset`, which only ever
    /// receives start-before/start-after tolerances expressed in
    /// weeks/days/hours/minutes/seconds in practice.
    pub fn fixed_seconds(&self) -> i64 {
        let weeks = self.weeks as i64 * 7 * 24 * 3600;
        let days = self.days as i64 * 24 * 3600;
        let hours = self.hours as i64 * 3600;
        let minutes = self.minutes as i64 * 60;
        let seconds = self.seconds as i64;
        weeks + days + hours + minutes + seconds
    }

    /// Applies this duration to `from`, honoring its sign. Years/months
    /// go through `chrono`'s calendar-aware `Months` arithmetic; every
    /// other field is a fixed number of seconds.
    pub fn offset(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let months = Months::new(self.years * 12 + self.months);
        let stepped = if self.negative {
            from.checked_sub_months(months).unwrap_or(from)
        } else {
            from.checked_add_months(months).unwrap_or(from)
        };
        let delta = ChronoDuration::seconds(self.fixed_seconds());
        if self.negative {
            stepped - delta
        } else {
            stepped + delta
        }
    }
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^
            ([+-])?
            P
            (?:(\d+)Y)?
            (?:(\d+)Mo)?
            (?:(\d+)W)?
            (?:(\d+)D)?
            (?:
                T
                (?:(\d+)H)?
                (?:(\d+)M)?
                (?:(\d+)S)?
            )?
            $
            ",
        )
        .expect("static duration pattern is valid")
    })
}

impl std::fmt::Display for CalendarDuration {
    /// Canonical form, always carrying an explicit sign and at least one
    /// field (`P0D` for a zero duration) — used by the parser round-trip
    /// property test.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}P", if self.negative { "-" } else { "+" })?;
        if self.years > 0 {
            write!(f, "{}Y", self.years)?;
        }
        if self.months > 0 {
            write!(f, "{}Mo", self.months)?;
        }
        if self.weeks > 0 {
            write!(f, "{}W", self.weeks)?;
        }
        if self.days > 0 {
            write!(f, "{}D", self.days)?;
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            write!(f, "T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0 {
                write!(f, "{}S", self.seconds)?;
            }
        }
        if self.is_zero() {
            write!(f, "0D")?;
        }
        Ok(())
    }
}

fn digits(m: Option<regex::Match>) -> u32 {
    m.and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

/// Parse an ISO-8601/RFC-5545-flavored duration string. Fails when no
/// field at all is present (`"P"`, `"+P"`, or anything that doesn't match
/// the grammar).
pub fn parse_duration(s: &str) -> Result<CalendarDuration, ScheduleError> {
    let caps = pattern()
        .captures(s.trim())
        .ok_or_else(|| ScheduleError::MalformedDuration(s.to_owned()))?;

    // A bare "P"/"+P"/"-P" matches the grammar but carries no field at
    // all, which is malformed.
    if (2..=8).all(|i| caps.get(i).is_none()) {
        return Err(ScheduleError::MalformedDuration(s.to_owned()));
    }

    let negative = caps.get(1).map(|m| m.as_str() == "-").unwrap_or(false);
    Ok(CalendarDuration {
        negative,
        years: digits(caps.get(2)),
        months: digits(caps.get(3)),
        weeks: digits(caps.get(4)),
        days: digits(caps.get(5)),
        hours: digits(caps.get(6)),
        minutes: digits(caps.get(7)),
        seconds: digits(caps.get(8)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_fields() {
        let d = parse_duration("P1Y2Mo3W4DT5H6M7S").unwrap();
        assert_eq!(d.years, 1);
        assert_eq!(d.months, 2);
        assert_eq!(d.weeks, 3);
        assert_eq!(d.days, 4);
        assert_eq!(d.hours, 5);
        assert_eq!(d.minutes, 6);
        assert_eq!(d.seconds, 7);
        assert!(!d.negative);
    }

    #[test]
    fn defaults_sign_to_positive() {
        assert!(!parse_duration("PT5M").unwrap().negative);
    }

    #[test]
    fn honors_explicit_sign() {
        assert!(parse_duration("-PT5M").unwrap().negative);
        assert!(!parse_duration("+PT5M").unwrap().negative);
    }

    #[test]
    fn rejects_empty_duration() {
        assert!(parse_duration("P").is_err());
        assert!(parse_duration("garbage").is_err());
    }

    #[test]
    fn accepts_zero_valued_sentinel() {
        let d = parse_duration("PT0S").unwrap();
        assert!(d.is_zero());
    }

    #[test]
    fn applies_calendar_relative_month_offsets() {
        use chrono::TimeZone;
        let start = chrono::Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let d = parse_duration("P1Y2Mo").unwrap();
        // year/month fields step by calendar months, not a fixed number
        // of seconds - a leap day in between must not shift the result.
        assert_eq!(d.offset(start).format("%Y-%m-%d").to_string(), "2025-03-15");
    }

    #[test]
    fn negative_duration_subtracts() {
        let start = parse_duration("-PT1H").unwrap();
        assert!(start.negative);
    }

    #[test]
    fn matches_spec_example_intervals() {
        for (s, expect_secs) in [("PT5M", 300), ("PT30S", 30)] {
            let d = parse_duration(s).unwrap();
            assert_eq!(d.fixed_seconds(), expect_secs);
        }
        let twelve_hours = parse_duration("PT12H").unwrap();
        assert_eq!(twelve_hours.fixed_seconds(), 12 * 3600);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn canonical_format_round_trips(
            negative in any::<bool>(),
            years in 0u32..5,
            months in 0u32..12,
            weeks in 0u32..5,
            days in 0u32..7,
            hours in 0u32..24,
            minutes in 0u32..60,
            seconds in 0u32..60,
        ) {
            let d = CalendarDuration { negative, years, months, weeks, days, hours, minutes, seconds };
            let reparsed = parse_duration(&d.to_string()).unwrap();
            prop_assert_eq!(d, reparsed);
        }
    }
}
