//! Normalization of heterogeneous raw message payloads into an ordered
//! canonical message stream.
//!
//! Each upstream job carries its session's messages as a loosely-typed blob
//! in one of several encodings (see [`raw`]). Normalization decodes the blob,
//! drops records without usable content or with an unrecognizable sender,
//! resolves timestamps, and emits messages sorted chronologically (stable for
//! ties). Records are never rejected for an unparseable timestamp alone; the
//! current processing time is substituted instead.

pub mod dump;
pub mod raw;
pub mod timestamp;

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::warn,
};

use envio_common::now_ms;

/// Content markers that stand in for non-text media; carry no text to send.
const PLACEHOLDER_CONTENT: &[&str] = &["__image__", "__audio__", "__file__", "<image>", "<audio>"];

/// Who sent a message. Records that classify to none of these are dropped
/// during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    Customer,
    Bot,
    Agent,
}

/// One canonical message: non-empty trimmed content, a known actor, and a
/// resolved epoch-millis timestamp. `raw` keeps the original record for
/// logging and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub ts_ms: i64,
    pub actor_type: ActorType,
    pub actor_email: Option<String>,
    pub content: String,
    pub raw: Value,
}

/// Map a free-text origin field to an actor, capturing the agent email from
/// auxiliary metadata when present. Returns `None` for unknown origins.
fn classify_actor(origin: Option<&str>, record: &Value) -> Option<(ActorType, Option<String>)> {
    let origin = origin?.trim().to_lowercase();
    match origin.as_str() {
        "user" | "cliente" | "customer" => Some((ActorType::Customer, None)),
        "bot" | "flow" | "ivr" | "system" => Some((ActorType::Bot, None)),
        "operator" | "agente" | "agent" | "supervisor" => {
            let email = ["operador_email", "agent_email"]
                .iter()
                .find_map(|key| record.get(*key))
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|e| !e.is_empty());
            Some((ActorType::Agent, email))
        },
        _ => None,
    }
}

fn content_of(record: &Value) -> Option<String> {
    let text = match record.get("mensaje")? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() || PLACEHOLDER_CONTENT.contains(&trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Normalize a raw message blob into an ordered, filtered message stream.
pub fn normalize(raw_blob: &Value) -> Vec<NormalizedMessage> {
    let mut output = Vec::new();

    for record in raw::load_raw_records(raw_blob) {
        if !record.is_object() {
            warn!(?record, "skipping non-object message record");
            continue;
        }

        let Some(content) = content_of(&record) else {
            continue;
        };

        let origin = record.get("us_origen").and_then(Value::as_str);
        let Some((actor_type, actor_email)) = classify_actor(origin, &record) else {
            warn!(origin = origin.unwrap_or(""), "dropping message with unknown actor");
            continue;
        };

        let ts_ms = record
            .get("message_time")
            .and_then(timestamp::parse_timestamp_ms)
            .unwrap_or_else(now_ms);

        output.push(NormalizedMessage {
            ts_ms,
            actor_type,
            actor_email,
            content,
            raw: record,
        });
    }

    // Chronological order; ties keep input order.
    output.sort_by_key(|m| m.ts_ms);
    output
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn shape(messages: &[NormalizedMessage]) -> Vec<(ActorType, &str, i64)> {
        messages
            .iter()
            .map(|m| (m.actor_type, m.content.as_str(), m.ts_ms))
            .collect()
    }

    #[test]
    fn equivalent_encodings_normalize_identically() {
        let native = json!([
            {"mensaje": "Hola", "us_origen": "user", "message_time": "2025-12-04T00:50:54.884Z"},
            {"mensaje": "Buenas", "us_origen": "bot", "message_time": "2025-12-04T00:51:00Z"},
        ]);
        let json_string = Value::String(native.to_string());
        let dump = json!(
            "[{'message_time': datetime.datetime(2025, 12, 4, 0, 50, 54, 884000, tzinfo=<UTC>), 'us_origen': 'user', 'mensaje': 'Hola'} {'message_time': datetime.datetime(2025, 12, 4, 0, 51, 0, 0, tzinfo=<UTC>), 'us_origen': 'bot', 'mensaje': 'Buenas'}]"
        );

        let a = normalize(&native);
        let b = normalize(&json_string);
        let c = normalize(&dump);

        assert_eq!(shape(&a), shape(&b));
        assert_eq!(shape(&a), shape(&c));
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].content, "Hola");
        assert_eq!(a[0].ts_ms, 1764809454884);
    }

    #[test]
    fn empty_and_placeholder_content_is_dropped() {
        let raw = json!([
            {"mensaje": "", "us_origen": "user", "message_time": 1000},
            {"mensaje": "   ", "us_origen": "user", "message_time": 1000},
            {"mensaje": "__image__", "us_origen": "user", "message_time": 1000},
            {"mensaje": "<audio>", "us_origen": "bot", "message_time": 1000},
            {"mensaje": null, "us_origen": "user", "message_time": 1000},
            {"mensaje": "real text", "us_origen": "user", "message_time": 1764809454884i64},
        ]);
        let out = normalize(&raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "real text");
    }

    #[test]
    fn unknown_actor_is_dropped() {
        let raw = json!([
            {"mensaje": "who dis", "us_origen": "martian", "message_time": 1764809454884i64},
            {"mensaje": "ok", "us_origen": "system", "message_time": 1764809454884i64},
        ]);
        let out = normalize(&raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].actor_type, ActorType::Bot);
    }

    #[test]
    fn fallback_wrapped_garbage_never_survives() {
        // An unparseable string wraps as an unknown-origin record, which the
        // actor filter then drops.
        assert!(normalize(&json!("not a conversation at all")).is_empty());
    }

    #[test]
    fn classification_is_case_insensitive_and_captures_agent_email() {
        let raw = json!([
            {"mensaje": "hola", "us_origen": "CLIENTE", "message_time": 1764809454884i64},
            {"mensaje": "dime", "us_origen": "Operator", "operador_email": "Ana@Example.com",
             "message_time": 1764809455000i64},
            {"mensaje": "listo", "us_origen": "agent", "agent_email": "b@c.d",
             "message_time": 1764809456000i64},
        ]);
        let out = normalize(&raw);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].actor_type, ActorType::Customer);
        assert_eq!(out[1].actor_type, ActorType::Agent);
        assert_eq!(out[1].actor_email.as_deref(), Some("Ana@Example.com"));
        assert_eq!(out[2].actor_email.as_deref(), Some("b@c.d"));
    }

    #[test]
    fn output_is_sorted_with_stable_ties() {
        let raw = json!([
            {"mensaje": "third", "us_origen": "user", "message_time": 3000},
            {"mensaje": "tie-a", "us_origen": "user", "message_time": 1000},
            {"mensaje": "tie-b", "us_origen": "bot", "message_time": 1000},
            {"mensaje": "second", "us_origen": "user", "message_time": 2000},
        ]);
        let out = normalize(&raw);
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["tie-a", "tie-b", "second", "third"]);
    }

    #[test]
    fn unparseable_timestamp_substitutes_now_instead_of_dropping() {
        let before = now_ms();
        let raw = json!([
            {"mensaje": "hola", "us_origen": "user", "message_time": "???"},
        ]);
        let out = normalize(&raw);
        assert_eq!(out.len(), 1);
        assert!(out[0].ts_ms >= before);
    }

    #[test]
    fn non_string_content_is_stringified() {
        let raw = json!([
            {"mensaje": 42, "us_origen": "user", "message_time": 1000},
        ]);
        let out = normalize(&raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "42");
    }
}
