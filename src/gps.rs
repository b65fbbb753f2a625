//! Conversion between UTC wall-clock times and GPS seconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::error::GwError;

const TEXT_FORMATS: [&str; 4] = [
    "%a %b %d %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%b %d %Y %H:%M:%S",
];

/// A time as written in a job file: either GPS seconds or a UTC string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSpec {
    Gps(i64),
    Text(String),
}

impl TimeSpec {
    pub fn to_gps(&self) -> Result<i64, GwError> {
        match self {
            TimeSpec::Gps(value) => Ok(*value),
            TimeSpec::Text(text) => parse_gps(text),
        }
    }
}

pub fn unix_to_gps(unix: i64) -> i64 {
    Epoch::from_unix_seconds(unix as f64).to_gpst_seconds().round() as i64
}

pub fn gps_to_unix(gps: i64) -> i64 {
    Epoch::from_gpst_seconds(gps as f64).to_unix_seconds().round() as i64
}

/// Parse an integer GPS time or a UTC time string into GPS seconds.
pub fn parse_gps(text: &str) -> Result<i64, GwError> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        if !value.is_finite() || value.abs() >= i64::MAX as f64 {
            return Err(GwError::InvalidTime(text.to_string()));
        }
        return Ok(value.floor() as i64);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(unix_to_gps(parsed.timestamp()));
    }
    for format in TEXT_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(unix_to_gps(Utc.from_utc_datetime(&naive).timestamp()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| GwError::InvalidTime(text.to_string()))?;
        return Ok(unix_to_gps(Utc.from_utc_datetime(&naive).timestamp()));
    }
    Err(GwError::InvalidTime(text.to_string()))
}

/// Render GPS seconds as an ISO 8601 UTC timestamp.
pub fn gps_to_iso(gps: i64) -> Result<String, GwError> {
    let unix = gps_to_unix(gps);
    Utc.timestamp_opt(unix, 0)
        .single()
        .map(|time| time.format("%Y-%m-%dT%H:%M:%S").to_string())
        .ok_or_else(|| GwError::InvalidTime(gps.to_string()))
}
