//! Boundary validation for backend responses.
//!
//! The backend is inconsistent about envelopes: some list endpoints answer
//! with a bare array, others wrap it (`{"engineers": [...]}`). Everything
//! that crosses the wire goes through these helpers so an unexpected shape
//! becomes a [`ParseError`] instead of an empty list.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected {expected}, found {found}")]
    UnexpectedShape { expected: String, found: &'static str },
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a list that is either a bare array or an object holding the array under `key`.
pub fn decode_list<T: DeserializeOwned>(body: &str, key: &str) -> Result<Vec<T>, ParseError> {
    let value: Value = serde_json::from_str(body)?;
    let items = match value {
        items @ Value::Array(_) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(items @ Value::Array(_)) => items,
            Some(other) => {
                return Err(ParseError::UnexpectedShape {
                    expected: format!("array under `{}`", key),
                    found: kind(&other),
                })
            }
            None => {
                return Err(ParseError::UnexpectedShape {
                    expected: format!("array or object with `{}`", key),
                    found: "object without that key",
                })
            }
        },
        other => {
            return Err(ParseError::UnexpectedShape {
                expected: format!("array or object with `{}`", key),
                found: kind(&other),
            })
        }
    };
    Ok(serde_json::from_value(items)?)
}

/// Decode a single JSON object.
pub fn decode_object<T: DeserializeOwned>(body: &str) -> Result<T, ParseError> {
    let value: Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Err(ParseError::UnexpectedShape {
            expected: "object".to_string(),
            found: kind(&value),
        });
    }
    Ok(serde_json::from_value(value)?)
}

/// Decode an object that may arrive wrapped as `{ key: {...} }`.
pub fn decode_enveloped<T: DeserializeOwned>(body: &str, key: &str) -> Result<T, ParseError> {
    let value: Value = serde_json::from_str(body)?;
    let inner = match value {
        Value::Object(mut map) => match map.remove(key) {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                map.insert(key.to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => {
            return Err(ParseError::UnexpectedShape {
                expected: "object".to_string(),
                found: kind(&other),
            })
        }
    };
    Ok(serde_json::from_value(inner)?)
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"detail": "..."}`, FastAPI validation lists
/// (`{"detail": [{"msg": "..."}]}`), `{"message": "..."}` and `{"error": "..."}`.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let map = value.as_object()?;

    if let Some(detail) = map.get("detail") {
        match detail {
            Value::String(s) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Value::Array(entries) => {
                let msgs: Vec<&str> = entries
                    .iter()
                    .filter_map(|e| e.get("msg").and_then(Value::as_str))
                    .collect();
                if !msgs.is_empty() {
                    return Some(msgs.join("; "));
                }
            }
            _ => {}
        }
    }

    ["message", "error"]
        .iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

/// Record ids arrive as strings or integers depending on the table.
pub fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive timestamps from the backend are UTC
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn de_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
}

pub fn de_opt_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw))),
    }
}

/// Progress is a percentage; fractional values are rounded, anything outside 0..=100 is rejected.
pub fn de_progress<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if !(0.0..=100.0).contains(&raw) {
        return Err(de::Error::custom(format!("progress out of range: {}", raw)));
    }
    Ok(raw.round() as u8)
}
