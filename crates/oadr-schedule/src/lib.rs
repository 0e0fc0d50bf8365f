//! Pure scheduling primitives for OpenADR event activation: duration
//! parsing, interval selection and randomized start-offset computation.
//! No I/O, no async — everything here is a deterministic function over
//! `chrono` types (bar `random_offset`, which draws from `rand`).

mod datetime;
mod duration;
mod interval;

pub use datetime::{dttm_to_str, str_to_datetime};
pub use duration::{parse_duration, CalendarDuration};
pub use interval::{choose_interval, durations_to_dates, random_offset, IntervalChoice};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("malformed duration string: {0:?}")]
    MalformedDuration(String),
    #[error("malformed datetime string: {0:?}")]
    MalformedDateTime(String),
}
