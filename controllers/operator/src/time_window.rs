//! Dispatch window evaluation
//!
//! A window is either daily (`HH:MM:SS`, may wrap past midnight) or
//! absolute (`YYYY-MM-DD HH:MM:SS`, never wraps). Seconds may be omitted on
//! either form. Both bounds must use the same form. The start is inclusive,
//! the end exclusive. Times are evaluated in the operator's local timezone.

use chrono::{Local, NaiveDateTime, NaiveTime};
use thiserror::Error;

const DAILY_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];
const ABSOLUTE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeWindowError {
    #[error("only one of startTime and endTime is set")]
    MissingBound,

    #[error("cannot parse '{0}' as HH:MM:SS or YYYY-MM-DD HH:MM:SS")]
    Unparseable(String),

    #[error("startTime and endTime use different formats")]
    MixedFormats,

    #[error("startTime equals endTime")]
    Empty,

    #[error("absolute endTime is before startTime")]
    EndBeforeStart,
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Daily(NaiveTime),
    Absolute(NaiveDateTime),
}

fn parse_bound(raw: &str) -> Result<Bound, TimeWindowError> {
    for format in DAILY_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(raw, format) {
            return Ok(Bound::Daily(time));
        }
    }
    for format in ABSOLUTE_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Bound::Absolute(datetime));
        }
    }
    Err(TimeWindowError::Unparseable(raw.to_string()))
}

/// Whether the current local time falls inside the window.
/// An empty window (both bounds blank) always matches.
pub fn is_within_time_window(start: &str, end: &str) -> Result<bool, TimeWindowError> {
    is_within_time_window_at(start, end, Local::now().naive_local())
}

pub fn is_within_time_window_at(start: &str, end: &str, now: NaiveDateTime) -> Result<bool, TimeWindowError> {
    let (start, end) = (start.trim(), end.trim());
    match (start.is_empty(), end.is_empty()) {
        (true, true) => return Ok(true),
        (true, false) | (false, true) => return Err(TimeWindowError::MissingBound),
        (false, false) => {}
    }

    match (parse_bound(start)?, parse_bound(end)?) {
        (Bound::Daily(start), Bound::Daily(end)) => {
            let now = now.time();
            if start == end {
                Err(TimeWindowError::Empty)
            } else if start < end {
                Ok(start <= now && now < end)
            } else {
                // wraps past midnight
                Ok(now >= start || now < end)
            }
        }
        (Bound::Absolute(start), Bound::Absolute(end)) => {
            if start == end {
                Err(TimeWindowError::Empty)
            } else if end < start {
                Err(TimeWindowError::EndBeforeStart)
            } else {
                Ok(start <= now && now < end)
            }
        }
        _ => Err(TimeWindowError::MixedFormats),
    }
}
