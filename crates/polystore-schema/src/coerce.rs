//! Value coercion.
//!
//! Incoming record values are cast to their declared field type before they
//! reach either engine, so both engines store the same thing for the same
//! input: numeric strings become numbers, `"true"`/`"false"` become booleans,
//! dates are normalized to RFC 3339 UTC with millisecond precision.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Number, Value};

use crate::field::{FieldDef, FieldType};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp in any of the accepted textual forms.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` (read as UTC) and bare
/// `YYYY-MM-DD` (midnight UTC).
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Render a timestamp the way records carry it.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Cast `value` to the type declared by `field`.
///
/// `null` passes through untouched; requiredness is checked by validation.
///
/// # Errors
///
/// Returns a human-readable message when the value cannot be cast.
pub fn coerce_value(field: &FieldDef, value: Value) -> Result<Value, String> {
    if value.is_null() {
        return Ok(value);
    }
    match field.field_type {
        FieldType::String => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(cast_error(&other, field.field_type)),
        },
        FieldType::Number => match value {
            Value::Number(_) => Ok(value),
            Value::String(ref s) => parse_number(s).ok_or_else(|| cast_error(&value, field.field_type)),
            other => Err(cast_error(&other, field.field_type)),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(cast_error(&value, field.field_type)),
            },
            Value::Number(ref n) => match n.as_i64() {
                Some(1) => Ok(Value::Bool(true)),
                Some(0) => Ok(Value::Bool(false)),
                _ => Err(cast_error(&value, field.field_type)),
            },
            other => Err(cast_error(&other, field.field_type)),
        },
        FieldType::Date => match value {
            Value::String(ref s) => parse_timestamp(s)
                .map(|dt| Value::String(format_timestamp(dt)))
                .ok_or_else(|| cast_error(&value, field.field_type)),
            Value::Number(ref n) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .map(|dt| Value::String(format_timestamp(dt)))
                .ok_or_else(|| cast_error(&value, field.field_type)),
            other => Err(cast_error(&other, field.field_type)),
        },
        FieldType::Object => match value {
            Value::Object(_) => Ok(value),
            other => Err(cast_error(&other, field.field_type)),
        },
        FieldType::Array => match value {
            Value::Array(_) => Ok(value),
            Value::Object(_) => Err(cast_error(&value, field.field_type)),
            scalar => Ok(Value::Array(vec![scalar])),
        },
        FieldType::Reference => match value {
            Value::String(_) | Value::Number(_) => Ok(value),
            // Extended JSON object id, e.g. {"$oid": "..."}
            Value::Object(ref map) if map.len() == 1 && map.contains_key("$oid") => Ok(value),
            other => Err(cast_error(&other, field.field_type)),
        },
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn cast_error(value: &Value, target: FieldType) -> String {
    format!("cannot cast {value} to {target}")
}
