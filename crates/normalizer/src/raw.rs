//! First-stage decoding of the raw message blob into individual records.
//!
//! A job's message payload arrives in one of several shapes: a native JSON
//! array of records, a single record object, a JSON-encoded string, a string
//! that itself wraps another JSON- or dump-encoded string, or the legacy dump
//! format handled by [`crate::dump`]. Strategies are tried in order; the
//! first success wins.

use {
    serde_json::{Value, json},
    tracing::warn,
};

use crate::dump::try_parse_dump;

/// Split the raw payload into individual record values.
///
/// Never fails: unrecognized string payloads are wrapped as a single
/// unknown-origin record (which actor classification will then drop),
/// unrecognized value types yield an empty list.
pub fn load_raw_records(raw: &Value) -> Vec<Value> {
    match raw {
        Value::Array(items) => items.clone(),

        Value::Object(map) => {
            // A single record whose `mensaje` field smuggles the whole
            // conversation as a dump string.
            if let Some(Value::String(inner)) = map.get("mensaje")
                && let Some(records) = try_parse_dump(inner.trim())
            {
                return records;
            }
            vec![raw.clone()]
        },

        Value::String(s) => load_from_string(s),

        other => {
            warn!(kind = value_kind(other), "unrecognized raw message payload type");
            Vec::new()
        },
    }
}

fn load_from_string(s: &str) -> Vec<Value> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }

    // 1) Proper JSON. A decoded string means double encoding; try the dump
    //    decoder on the inner string.
    if let Ok(parsed) = serde_json::from_str::<Value>(s) {
        match parsed {
            Value::Array(items) => return items,
            Value::Object(_) => return vec![parsed],
            Value::String(inner) => {
                if let Some(records) = try_parse_dump(inner.trim()) {
                    return records;
                }
            },
            _ => {},
        }
    }

    // 2) The string itself in dump format.
    if let Some(records) = try_parse_dump(s) {
        return records;
    }

    // 3) Last resort: one unknown-origin textual message.
    vec![json!({
        "mensaje": s,
        "us_origen": "unknown",
        "message_time": null,
    })]
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
