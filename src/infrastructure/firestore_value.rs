// Conversion between plain JSON and Firestore typed values
use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Map, Number, Value};

/// Top-level field stored as `timestampValue` so history can be ordered.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Encode a JSON object into the `fields` map of a Firestore document.
pub fn encode_fields(document: &Value) -> Result<Map<String, Value>> {
    let Value::Object(fields) = document else {
        bail!("Firestore documents must be JSON objects");
    };

    Ok(fields
        .iter()
        .map(|(name, value)| {
            let encoded = match (name.as_str(), value) {
                (TIMESTAMP_FIELD, Value::String(ts)) => json!({ "timestampValue": ts }),
                _ => encode_value(value),
            };
            (name.clone(), encoded)
        })
        .collect())
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // Firestore wants 64-bit integers as strings
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({
            "mapValue": {
                "fields": map
                    .iter()
                    .map(|(k, v)| (k.clone(), encode_value(v)))
                    .collect::<Map<String, Value>>()
            }
        }),
    }
}

/// Decode the `fields` map of a Firestore document back into a JSON object.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Value> {
    let mut decoded = Map::with_capacity(fields.len());
    for (name, value) in fields {
        let value = decode_value(value).with_context(|| format!("Invalid Firestore field {}", name))?;
        decoded.insert(name.clone(), value);
    }
    Ok(Value::Object(decoded))
}

pub fn decode_value(value: &Value) -> Result<Value> {
    let (kind, inner) = value
        .as_object()
        .and_then(|typed| typed.iter().next())
        .ok_or_else(|| anyhow!("expected a typed Firestore value, got {}", value))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| anyhow!("booleanValue is not a boolean")),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().context("integerValue is not an integer")?,
                Value::Number(n) => n.as_i64().ok_or_else(|| anyhow!("integerValue out of range"))?,
                _ => bail!("integerValue has unexpected type"),
            };
            Ok(Value::from(parsed))
        }
        // NaN and Infinity arrive as strings and have no JSON form
        "doubleValue" => Ok(inner
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => match inner {
            Value::String(_) => Ok(inner.clone()),
            _ => bail!("{} is not a string", kind),
        },
        "arrayValue" => {
            let values = match inner.get("values").and_then(Value::as_array) {
                Some(items) => items.iter().map(decode_value).collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(fields) => decode_fields(fields),
            None => Ok(Value::Object(Map::new())),
        },
        other => bail!("unsupported Firestore value type {}", other),
    }
}
