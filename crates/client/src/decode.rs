//! Conversion of wire-format cells into typed values.
//!
//! The service sends every cell as a string. How that string is read depends
//! on the column's declared type, scale and precision.

use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use crate::error::{ClientError, Result};
use crate::result::Column;

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A decoded cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i128),
    Decimal(BigDecimal),
    Float(f64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Decode one cell according to its column metadata.
///
/// SQL NULL short-circuits to [`Value::Null`] whatever the column type.
pub fn decode(raw: Option<&str>, column: &Column) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let fail = |reason: String| ClientError::Decode {
        column: column.name.clone(),
        column_type: column.data_type.clone(),
        value: raw.to_string(),
        reason,
    };

    match column.data_type.as_str() {
        "boolean" => Ok(Value::Boolean(raw == "true")),
        "date" => decode_date(raw).map(Value::Date).map_err(fail),
        "fixed" => {
            if column.scale == 0 {
                raw.parse::<i128>()
                    .map(Value::Integer)
                    .map_err(|e| fail(e.to_string()))
            } else {
                BigDecimal::from_str(raw)
                    .map(|d| Value::Decimal(d.with_scale_round(column.scale, RoundingMode::HalfUp)))
                    .map_err(|e| fail(e.to_string()))
            }
        }
        // All of these are 64-bit IEEE 754 on the service side.
        "float" | "double" | "double precision" | "real" => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| fail(e.to_string())),
        "time" | "datetime" | "timestamp" | "timestamp_ltz" | "timestamp_ntz" | "timestamp_tz" => {
            decode_timestamp(raw).map(Value::Timestamp).map_err(fail)
        }
        _ => Ok(Value::Text(raw.to_string())),
    }
}

/// Days since 1970-01-01.
fn decode_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    let days: i64 = raw.trim().parse().map_err(|e| format!("{e}"))?;
    let delta = TimeDelta::try_days(days).ok_or_else(|| "day offset out of range".to_string())?;
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(delta))
        .ok_or_else(|| "date out of range".to_string())
}

/// `<epochSeconds>.<fraction>[ <offsetMinutes>]`.
///
/// The numeric part is already the UTC instant; a trailing offset token is
/// ignored rather than applied.
fn decode_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    let instant = raw
        .split_whitespace()
        .next()
        .ok_or_else(|| "empty timestamp".to_string())?;
    let (whole, fraction) = instant.split_once('.').unwrap_or((instant, ""));
    let negative = whole.starts_with('-');

    let mut seconds: i64 = whole.parse().map_err(|e| format!("{e}"))?;
    let mut nanos = parse_nanos(fraction)?;
    if negative && nanos > 0 {
        seconds -= 1;
        nanos = NANOS_PER_SECOND - nanos;
    }

    DateTime::from_timestamp(seconds, nanos).ok_or_else(|| "timestamp out of range".to_string())
}

/// Fractional digits as nanoseconds; digits past the ninth are dropped.
fn parse_nanos(fraction: &str) -> std::result::Result<u32, String> {
    if fraction.is_empty() {
        return Ok(0);
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid fractional seconds {fraction:?}"));
    }
    let digits: String = fraction.chars().take(9).collect();
    let scale = 10u32.pow(9 - digits.len() as u32);
    digits
        .parse::<u32>()
        .map(|n| n * scale)
        .map_err(|e| format!("{e}"))
}
