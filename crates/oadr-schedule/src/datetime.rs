use chrono::{DateTime, NaiveDateTime, Utc};

use crate::ScheduleError;

const FORM_WHOLE: &str = "%Y-%m-%dT%H:%M:%SZ";
const FORM_FRACTIONAL: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Parses `YYYY-MM-DDTHH:MM:SSZ`, with or without a fractional-seconds
/// group. Remembers nothing about which form was used — round-tripping
/// back to the *same* textual form is `dttm_to_str`'s job, driven by its
/// own `with_fractional` flag, not by this function.
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>, ScheduleError> {
    let err = || ScheduleError::MalformedDateTime(s.to_owned());

    if s.contains('.') {
        let naive = NaiveDateTime::parse_from_str(s, FORM_FRACTIONAL).map_err(|_| err())?;
        Ok(naive.and_utc())
    } else {
        let naive = NaiveDateTime::parse_from_str(s, FORM_WHOLE).map_err(|_| err())?;
        Ok(naive.and_utc())
    }
}

/// Formats `dt` as `YYYY-MM-DDTHH:MM:SSZ`, or with a fractional-seconds
/// group when `with_fractional` is set. Round-trips through
/// `str_to_datetime` as long as the caller picks the form matching the
/// one it parsed.
pub fn dttm_to_str(dt: &DateTime<Utc>, with_fractional: bool) -> String {
    if with_fractional {
        dt.format(FORM_FRACTIONAL).to_string()
    } else {
        dt.format(FORM_WHOLE).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_whole_seconds() {
        let s = "2013-05-12T08:30:50Z";
        let dt = str_to_datetime(s).unwrap();
        assert_eq!(dttm_to_str(&dt, false), s);
    }

    #[test]
    fn round_trips_fractional_seconds() {
        let s = "2013-05-12T08:30:50.250000Z";
        let dt = str_to_datetime(s).unwrap();
        assert_eq!(dttm_to_str(&dt, true), s);
    }

    #[test]
    fn rejects_garbage() {
        assert!(str_to_datetime("not a date").is_err());
    }
}
