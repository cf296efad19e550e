//! Canonical time keys for candles
//!
//! The data feed sends dates as ISO-8601 strings, epoch numbers in seconds or
//! milliseconds, or strings that merely start with a `YYYY-MM-DD` date. All of
//! them are folded into a [`TimeKey`] whose shape depends on the granularity:
//! a calendar day for daily-or-coarser candles, epoch seconds for intraday ones.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

use super::Granularity;

/// Epoch magnitudes above this are milliseconds, everything else is seconds.
pub const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Canonical position of a candle on the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeKey {
    /// Calendar day (UTC) for `1d` and coarser.
    Day(NaiveDate),
    /// Epoch seconds for intraday candles.
    Epoch(i64),
}

impl TimeKey {
    /// Instant at the start of the key, used for axis labels.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            TimeKey::Day(day) => day.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            TimeKey::Epoch(secs) => DateTime::<Utc>::from_timestamp(*secs, 0),
        }
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeKey::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
            TimeKey::Epoch(secs) => write!(f, "{}", secs),
        }
    }
}

impl Serialize for TimeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimeKey::Day(_) => serializer.collect_str(self),
            TimeKey::Epoch(secs) => serializer.serialize_i64(*secs),
        }
    }
}

/// Raw date value as it arrives from the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Number(f64),
    Text(String),
}

impl DateInput {
    /// Interpret a JSON value; anything other than a number or string is rejected.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(DateInput::Number),
            serde_json::Value::String(s) => Some(DateInput::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        DateInput::Text(value.to_string())
    }
}

impl From<String> for DateInput {
    fn from(value: String) -> Self {
        DateInput::Text(value)
    }
}

impl From<i64> for DateInput {
    fn from(value: i64) -> Self {
        DateInput::Number(value as f64)
    }
}

impl From<f64> for DateInput {
    fn from(value: f64) -> Self {
        DateInput::Number(value)
    }
}

impl fmt::Display for DateInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateInput::Number(n) => write!(f, "{}", n),
            DateInput::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// A date value that could not be turned into a valid instant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unparseable date value: {input}")]
pub struct Unparseable {
    pub input: String,
}

impl Unparseable {
    fn new(input: &DateInput) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

/// Normalize a raw date into the key used for `granularity`.
pub fn normalize(input: &DateInput, granularity: Granularity) -> Result<TimeKey, Unparseable> {
    let instant = parse_instant(input).ok_or_else(|| Unparseable::new(input))?;

    if granularity.is_intraday() {
        Ok(TimeKey::Epoch(instant.timestamp()))
    } else {
        Ok(TimeKey::Day(instant.date_naive()))
    }
}

/// Resolve a raw date into a UTC instant.
pub fn parse_instant(input: &DateInput) -> Option<DateTime<Utc>> {
    match input {
        DateInput::Number(value) => from_epoch(*value),
        DateInput::Text(text) => {
            let text = text.trim();
            parse_date_text(text)
                .or_else(|| text.parse::<f64>().ok().and_then(from_epoch))
                .or_else(|| parse_date_prefix(text))
        }
    }
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }

    let millis = if value.abs() > EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };

    // Outside i64 range the cast saturates and chrono rejects the instant.
    DateTime::<Utc>::from_timestamp_millis(millis.round() as i64)
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_date_prefix(text: &str) -> Option<DateTime<Utc>> {
    let prefix = text.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
