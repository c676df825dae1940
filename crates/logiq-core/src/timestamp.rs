//! Canonical event time for incoming logs
//!
//! Clients send timestamps in whatever shape they have. Everything resolves to
//! a UTC instant; input that cannot be understood falls back to the ingestion
//! time with a warning instead of failing the task.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("unrecognized timestamp '{0}'")]
    Unparseable(String),

    #[error("epoch value {0} is out of range")]
    OutOfRange(f64),
}

/// Client supplied event time, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampInput {
    /// No offset attached; taken as UTC.
    Naive(NaiveDateTime),
    /// Carries an offset; converted to UTC.
    Aware(DateTime<FixedOffset>),
    /// Free text, parsed permissively.
    Text(String),
    /// Seconds since the Unix epoch.
    UnixSeconds(f64),
}

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses ISO 8601 / RFC 3339 text. A trailing `Z` means UTC, values without
/// an offset are UTC, a bare date is midnight UTC.
pub fn parse_timestamp_str(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = raw.trim();
    let text = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(stripped) => format!("{stripped}+00:00"),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&text, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&text, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    Err(TimestampError::Unparseable(raw.to_string()))
}

impl TimestampInput {
    /// Strict conversion to UTC.
    pub fn to_utc(&self) -> Result<DateTime<Utc>, TimestampError> {
        match self {
            TimestampInput::Naive(naive) => Ok(Utc.from_utc_datetime(naive)),
            TimestampInput::Aware(aware) => Ok(aware.with_timezone(&Utc)),
            TimestampInput::Text(text) => parse_timestamp_str(text),
            TimestampInput::UnixSeconds(secs) => {
                if !secs.is_finite() {
                    return Err(TimestampError::OutOfRange(*secs));
                }
                let micros = (secs * 1_000_000.0).round();
                if micros.abs() >= i64::MAX as f64 {
                    return Err(TimestampError::OutOfRange(*secs));
                }
                DateTime::from_timestamp_micros(micros as i64)
                    .ok_or(TimestampError::OutOfRange(*secs))
            }
        }
    }
}

/// Canonical log time: the parsed input, or `now` when it is absent or unusable.
pub fn resolve_log_timestamp(input: Option<&TimestampInput>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(input) = input else {
        return now;
    };
    match input.to_utc() {
        Ok(ts) => ts,
        Err(e) => {
            warn!(error = %e, "Unable to parse log timestamp; defaulting to now");
            now
        }
    }
}

impl From<DateTime<Utc>> for TimestampInput {
    fn from(value: DateTime<Utc>) -> Self {
        TimestampInput::Aware(value.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for TimestampInput {
    fn from(value: DateTime<FixedOffset>) -> Self {
        TimestampInput::Aware(value)
    }
}

impl From<NaiveDateTime> for TimestampInput {
    fn from(value: NaiveDateTime) -> Self {
        TimestampInput::Naive(value)
    }
}

impl From<&str> for TimestampInput {
    fn from(value: &str) -> Self {
        TimestampInput::Text(value.to_string())
    }
}

impl Serialize for TimestampInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimestampInput::Naive(naive) => {
                serializer.serialize_str(&naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            TimestampInput::Aware(aware) => serializer.serialize_str(&aware.to_rfc3339()),
            TimestampInput::Text(text) => serializer.serialize_str(text),
            TimestampInput::UnixSeconds(secs) => serializer.serialize_f64(*secs),
        }
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = TimestampInput;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a timestamp string or unix seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(TimestampInput::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(TimestampInput::Text(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(TimestampInput::UnixSeconds(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(TimestampInput::UnixSeconds(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(TimestampInput::UnixSeconds(v))
    }
}

impl<'de> Deserialize<'de> for TimestampInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}
