//! Forgiving serde adapters for hand-edited remote documents.
//!
//! Remote files are written by several app versions and occasionally by
//! hand, so a number may arrive as a string and a string as a number.

use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Largest integer an IEEE double holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Reads a number out of any JSON scalar; anything unreadable becomes 0.
#[must_use]
pub fn value_to_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_f64(s),
        _ => 0.0,
    }
}

/// Parses a decimal string; blank or garbage becomes 0.
#[must_use]
pub fn parse_f64(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// Renders a number the way the other clients do: integral values without a
/// fractional part.
#[must_use]
pub fn format_f64(n: f64) -> String {
    if !n.is_finite() {
        return String::new();
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Lenient `f64` field.
pub mod number {
    use super::*;

    /// Deserializes any scalar as a number.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value_to_f64(&value))
    }

    /// Serializes integral values as JSON integers.
    pub fn serialize<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if !n.is_finite() {
            serializer.serialize_none()
        } else if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
            serializer.serialize_i64(*n as i64)
        } else {
            serializer.serialize_f64(*n)
        }
    }
}

/// Lenient `String` field: numbers and booleans are stringified, null is empty.
pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value).unwrap_or_default())
}

/// Lenient `Option<String>` field: null is `None`.
pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value))
}

/// Lenient flag: `true` or the string `"true"`.
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(matches!(&value, Value::Bool(true)) || matches!(&value, Value::String(s) if s == "true"))
}

/// Renders a JSON scalar as text.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
