//! CF-convention time units ("<unit> since <reference>")
//!
//! Source ObsPack files store `time`, `start_time` and `midpoint_time` as
//! offsets from a reference instant. Everything inside the crate works in
//! whole seconds since the Unix epoch (UTC); this module converts between the
//! two.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Units written to every daily output file.
pub const EPOCH_UNITS: &str = "seconds since 1970-01-01 00:00:00 UTC";

/// Calendar written to every daily output file.
pub const CALENDAR: &str = "proleptic_gregorian";

const SECONDS_PER_DAY: i64 = 86_400;

/// Step size of a CF time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStep {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeStep {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => Some(TimeStep::Seconds),
            "minutes" | "minute" | "mins" | "min" => Some(TimeStep::Minutes),
            "hours" | "hour" | "hrs" | "hr" | "h" => Some(TimeStep::Hours),
            "days" | "day" | "d" => Some(TimeStep::Days),
            _ => None,
        }
    }

    /// Length of one step in seconds
    pub fn seconds(self) -> i64 {
        match self {
            TimeStep::Seconds => 1,
            TimeStep::Minutes => 60,
            TimeStep::Hours => 3_600,
            TimeStep::Days => SECONDS_PER_DAY,
        }
    }
}

/// Parsed `units` attribute of a time variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub step: TimeStep,
    /// Reference instant in seconds since the Unix epoch
    pub reference: i64,
}

impl TimeUnits {
    /// Parses a CF units string. Returns `None` for anything that is not a
    /// time axis (e.g. "degrees_north").
    pub fn parse(units: &str) -> Option<Self> {
        let (step, reference) = units.trim().split_once(" since ")?;
        let step = TimeStep::parse(step.trim())?;
        let reference = parse_reference(reference)?;
        Some(TimeUnits {
            step,
            reference: reference.and_utc().timestamp(),
        })
    }

    /// Converts an integer offset to seconds since the Unix epoch.
    pub fn int_to_epoch(&self, offset: i64) -> i64 {
        self.reference + offset * self.step.seconds()
    }

    /// Converts a floating offset to seconds since the Unix epoch, rounded to
    /// the nearest second.
    pub fn float_to_epoch(&self, offset: f64) -> i64 {
        self.reference + (offset * self.step.seconds() as f64).round() as i64
    }
}

fn parse_reference(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    let text = text
        .strip_suffix("UTC")
        .or_else(|| text.strip_suffix('Z'))
        .unwrap_or(text)
        .trim();

    const FORMATS: [&str; 6] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Seconds since the Unix epoch at 00:00 UTC of `date`.
pub fn day_start(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Seconds since the Unix epoch at 00:00 UTC of the day after `date`.
pub fn day_end(date: NaiveDate) -> i64 {
    day_start(date) + SECONDS_PER_DAY
}
