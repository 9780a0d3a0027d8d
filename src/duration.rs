//! Human-readable intervals such as `"30 minutes"`, `"2h"`, or `"1.5 days"`.
//!
//! A bare number is read as milliseconds.

use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::time::Duration;

const SECOND: f64 = 1_000.0;
const MINUTE: f64 = SECOND * 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;
const WEEK: f64 = DAY * 7.0;
const YEAR: f64 = DAY * 365.25;

/// Parse an interval string into a [`Duration`].
///
/// Fails with [`Error::Config`] on unknown units, malformed numbers, and
/// intervals that are not strictly positive.
pub fn parse_interval(input: &str) -> Result<Duration> {
    static PATTERN: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)^(-?(?:\d+)?\.?\d+)\s*([a-z]+)?$").map_err(|err| err.to_string())
        })
        .as_ref()
        .map_err(|msg| Error::Config(format!("interval pattern init failed: {msg}")))?;

    let trimmed = input.trim();
    let caps = pattern
        .captures(trimmed)
        .ok_or_else(|| Error::Config(format!("unrecognized interval {input:?}")))?;
    let amount: f64 = caps[1]
        .parse()
        .map_err(|_| Error::Config(format!("bad number in interval {input:?}")))?;
    let unit = caps
        .get(2)
        .map_or_else(|| "ms".to_owned(), |m| m.as_str().to_lowercase());
    let scale = unit_millis(&unit)
        .ok_or_else(|| Error::Config(format!("unknown unit {unit:?} in interval {input:?}")))?;

    let millis = amount * scale;
    if !millis.is_finite() || millis < 1.0 {
        return Err(Error::Config(format!(
            "interval {input:?} must be at least one millisecond"
        )));
    }
    Ok(Duration::from_millis(millis.round() as u64))
}

fn unit_millis(unit: &str) -> Option<f64> {
    let scale = match unit {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => WEEK,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR,
        _ => return None,
    };
    Some(scale)
}
