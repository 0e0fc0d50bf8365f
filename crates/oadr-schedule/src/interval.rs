use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;

use crate::duration::CalendarDuration;

/// The three-way result of `choose_interval`. An explicit enum beats
/// overloading a single `-1`/index/`None` value for the same purpose —
/// the `NotStarted`/`Ended` distinction is load-bearing (callers remove
/// events on `Ended`, idle on `NotStarted`), so making the two
/// impossible to confuse is worth the extra type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalChoice {
    NotStarted,
    Active(usize),
    Ended,
}

/// `t_0 = start`, `t_{k+1} = t_k` offset by `durations[k]` (sign taken
/// from the duration itself). Returns `durations.len() + 1` instants.
pub fn durations_to_dates(
    start: DateTime<Utc>,
    durations: &[CalendarDuration],
) -> Vec<DateTime<Utc>> {
    let mut dates = Vec::with_capacity(durations.len() + 1);
    dates.push(start);
    let mut current = start;
    for d in durations {
        current = d.offset(current);
        dates.push(current);
    }
    dates
}

/// Finds the interval containing `now`: `NotStarted` before the event
/// begins, `Active(i)` with the index of the interval in force (including
/// the zero-duration "unending interval" sentinel), `Ended` once every
/// interval has elapsed.
pub fn choose_interval(
    start: DateTime<Utc>,
    durations: &[CalendarDuration],
    now: DateTime<Utc>,
) -> IntervalChoice {
    let dates = durations_to_dates(start, durations);
    let mut current_interval_end: Option<DateTime<Utc>> = None;

    for (i, &candidate) in dates.iter().enumerate() {
        if candidate > now || current_interval_end == Some(candidate) {
            return if i == 0 {
                IntervalChoice::NotStarted
            } else {
                IntervalChoice::Active(i - 1)
            };
        }
        current_interval_end = Some(candidate);
    }

    IntervalChoice::Ended
}

/// `t` when both tolerances are absent; otherwise a uniformly-random
/// instant in `[t - start_before, t + start_after]`, sampled at
/// whole-second granularity.
pub fn random_offset(
    t: DateTime<Utc>,
    start_before: Option<CalendarDuration>,
    start_after: Option<CalendarDuration>,
) -> DateTime<Utc> {
    if start_before.is_none() && start_after.is_none() {
        return t;
    }
    let before_secs = start_before.map(|d| d.fixed_seconds()).unwrap_or(0);
    let after_secs = start_after.map(|d| d.fixed_seconds()).unwrap_or(0);

    let offset_secs = if before_secs == 0 && after_secs == 0 {
        0
    } else {
        rand::thread_rng().gen_range(-before_secs..=after_secs)
    };
    t + ChronoDuration::seconds(offset_secs)
}
