//! Conversion of recognized values to a parameter's declared type.

use nlq_catalog::ParamType;
use serde_json::{Number, Value};

/// Converts `value` to `target`, returning the original on failure so the
/// validator can report the mismatch.
pub fn coerce(value: Value, target: ParamType) -> Result<Value, Value> {
    if target.accepts(&value) {
        return Ok(value);
    }
    match (target, value) {
        (ParamType::String, Value::Number(number)) => Ok(Value::String(number.to_string())),
        (ParamType::String, Value::Bool(flag)) => Ok(Value::String(flag.to_string())),
        (ParamType::String, Value::Array(items)) => {
            let parts: Option<Vec<String>> = items.iter().map(scalar_text).collect();
            parts.map_or(Err(Value::Array(items)), |parts| Ok(Value::String(parts.join(", "))))
        }
        (ParamType::Number, Value::String(text)) => parse_number(&text).ok_or(Value::String(text)),
        (ParamType::Boolean, Value::String(text)) => parse_bool(&text).ok_or(Value::String(text)),
        (ParamType::Boolean, Value::Number(number)) => match number.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(Value::Number(number)),
        },
        (ParamType::Array, Value::String(text)) => Ok(Value::Array(
            split_list(&text).into_iter().map(Value::String).collect(),
        )),
        (ParamType::Array, scalar @ (Value::Number(_) | Value::Bool(_))) => Ok(Value::Array(vec![scalar])),
        (ParamType::Object, Value::String(text)) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(parsed @ Value::Object(_)) => Ok(parsed),
            _ => Err(Value::String(text)),
        },
        (_, other) => Err(other),
    }
}

/// Splits `a, b and c` into its items.
#[must_use]
pub fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .flat_map(|part| part.split(" and "))
        .map(|part| part.trim().trim_matches(|ch: char| ch == '\'' || ch == '"').trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
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

fn parse_bool(text: &str) -> Option<Value> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" | "enable" | "enabled" => Some(Value::Bool(true)),
        "false" | "no" | "n" | "off" | "0" | "disable" | "disabled" => Some(Value::Bool(false)),
        _ => None,
    }
}
