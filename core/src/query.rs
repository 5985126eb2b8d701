//! Query parameter flattening.
//!
//! Arrays repeat their key without index suffixes (`ids=1&ids=2`), nested
//! objects use bracket paths (`page[size]=10`) and `null` values are dropped.
//! Pairs are returned decoded; the transport percent-encodes them.

use serde_json::Value;

pub fn encode_params(params: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    match params {
        Value::Object(map) => {
            for (key, value) in map {
                push_value(&mut pairs, key, value);
            }
        }
        Value::Null => {}
        other => tracing::warn!(params = %other, "query params must be an object, ignoring"),
    }
    pairs
}

fn push_value(pairs: &mut Vec<(String, String)>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                push_value(pairs, key, item);
            }
        }
        Value::Object(map) => {
            for (child, nested) in map {
                push_value(pairs, &format!("{key}[{child}]"), nested);
            }
        }
        Value::String(s) => pairs.push((key.to_string(), s.clone())),
        Value::Bool(_) | Value::Number(_) => pairs.push((key.to_string(), value.to_string())),
    }
}
