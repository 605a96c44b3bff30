//! Decoder for the legacy "object-literal dump" payload format.
//!
//! Some upstream rows carry the whole conversation as a stringified dump of
//! records, each delimited by braces and containing a date-constructor token
//! plus quoted key/value pairs:
//!
//! ```text
//! [{'message_time': datetime.datetime(2025, 12, 4, 0, 50, 54, 884000, tzinfo=<UTC>),
//!   'us_origen': 'user', 'mensaje': 'Hola', 'operador_email': None, ...} {...}]
//! ```
//!
//! The dump is decoded purely by field-pattern extraction; the embedded
//! expression syntax is never evaluated. Output records use the same field
//! names as the JSON encoding, with `message_time` already resolved to epoch
//! milliseconds.

use std::sync::OnceLock;

use {
    regex::Regex,
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use crate::timestamp::datetime_from_parts;

macro_rules! static_re {
    ($name:ident, $pattern:expr) => {
        #[allow(clippy::expect_used)]
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("pattern is valid"))
        }
    };
}

static_re!(block_re, r"\{[^{}]*\}");
static_re!(origin_re, r"'us_origen':\s*'([^']*)'");
static_re!(content_re, r"'mensaje':\s*'((?:\\'|[^'])*)'");
static_re!(time_re, r"datetime\.datetime\(([^)]*)\)");
static_re!(op_email_re, r"'operador_email':\s*'([^']*)'");
static_re!(op_name_re, r"'operador_nombre':\s*'([^']*)'");
static_re!(op_role_re, r"'operador_rol':\s*'([^']*)'");
static_re!(department_re, r"'departamento':\s*'([^']*)'");

/// Quick detection of the dump format before paying for block extraction.
fn looks_like_dump(s: &str) -> bool {
    s.contains("datetime.datetime") && s.contains("'us_origen':") && s.contains("'mensaje':")
}

/// Try to decode a dump string into a list of record values.
///
/// Returns `None` when the input does not look like the dump format or no
/// record block could be extracted; the caller then falls through to the
/// next parsing strategy.
pub fn try_parse_dump(s: &str) -> Option<Vec<Value>> {
    if !looks_like_dump(s) {
        return None;
    }

    let mut records = Vec::new();
    for block in block_re().find_iter(s) {
        records.push(parse_block(block.as_str()));
    }

    if records.is_empty() {
        warn!("dump-formatted payload contained no record blocks");
        return None;
    }

    debug!(records = records.len(), "decoded legacy dump payload");
    Some(records)
}

fn parse_block(block: &str) -> Value {
    let capture = |re: &Regex| {
        re.captures(block)
            .map(|c| c[1].to_string())
            .map(Value::String)
            .unwrap_or(Value::Null)
    };

    let content = content_re()
        .captures(block)
        .map(|c| Value::String(c[1].replace("\\'", "'")))
        .unwrap_or(Value::Null);

    json!({
        "message_time": parse_datetime_token(block),
        "us_origen": capture(origin_re()),
        "mensaje": content,
        "operador_email": capture(op_email_re()),
        "operador_nombre": capture(op_name_re()),
        "operador_rol": capture(op_role_re()),
        "departamento": capture(department_re()),
    })
}

/// Pull the leading integers out of a `datetime.datetime(...)` token.
/// Reading stops at the first non-numeric argument (e.g. `tzinfo=<UTC>`);
/// missing trailing fields default to zero. Fewer than three integers, or an
/// out-of-range date, yields `Null`.
fn parse_datetime_token(block: &str) -> Value {
    let Some(caps) = time_re().captures(block) else {
        return Value::Null;
    };

    let mut parts: Vec<i64> = Vec::with_capacity(7);
    for piece in caps[1].split(',') {
        match piece.trim().parse::<i64>() {
            Ok(n) => parts.push(n),
            Err(_) => break,
        }
    }
    if parts.len() < 3 {
        return Value::Null;
    }

    let get = |i: usize| parts.get(i).copied().unwrap_or(0);
    datetime_from_parts(
        parts[0],
        parts[1] as u32,
        parts[2] as u32,
        get(3) as u32,
        get(4) as u32,
        get(5) as u32,
        get(6),
    )
    .map(Value::from)
    .unwrap_or(Value::Null)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "[{'message_time': datetime.datetime(2025, 12, 4, 0, 50, 54, 884000, tzinfo=<UTC>), 'us_origen': 'user', 'mensaje': 'Hola, necesito ayuda', 'audios': None, 'operador_nombre': None, 'operador_email': None, 'operador_rol': None, 'departamento': None} {'message_time': datetime.datetime(2025, 12, 4, 0, 51, 2, 100000, tzinfo=<UTC>), 'us_origen': 'operator', 'mensaje': 'Claro, dime', 'operador_nombre': 'Ana', 'operador_email': 'ana@example.com', 'operador_rol': 'agent', 'departamento': 'ventas'}]";

    #[test]
    fn decodes_two_records() {
        let records = try_parse_dump(DUMP).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["us_origen"], "user");
        assert_eq!(records[0]["mensaje"], "Hola, necesito ayuda");
        assert_eq!(records[0]["message_time"], 1764809454884i64);
        assert_eq!(records[1]["operador_email"], "ana@example.com");
        assert_eq!(records[1]["departamento"], "ventas");
    }

    #[test]
    fn unescapes_quotes_in_content() {
        let dump = r"[{'message_time': datetime.datetime(2025, 1, 2, 3, 4, 5, 0), 'us_origen': 'bot', 'mensaje': 'it\'s fine'}]";
        let records = try_parse_dump(dump).unwrap();
        assert_eq!(records[0]["mensaje"], "it's fine");
    }

    #[test]
    fn missing_trailing_datetime_fields_default_to_zero() {
        let dump = "[{'message_time': datetime.datetime(2025, 12, 4), 'us_origen': 'user', 'mensaje': 'hi'}]";
        let records = try_parse_dump(dump).unwrap();
        assert_eq!(records[0]["message_time"], 1764806400000i64);
    }

    #[test]
    fn non_numeric_tail_stops_datetime_reading() {
        let dump = "[{'message_time': datetime.datetime(2025, 12, 4, 0, 50, 54, 884000, tzinfo=<UTC>), 'us_origen': 'user', 'mensaje': 'hi'}]";
        let records = try_parse_dump(dump).unwrap();
        assert_eq!(records[0]["message_time"], 1764809454884i64);
    }

    #[test]
    fn rejects_non_dump_strings() {
        assert!(try_parse_dump("just some text").is_none());
        assert!(try_parse_dump(r#"[{"mensaje": "json, not a dump"}]"#).is_none());
    }

    #[test]
    fn record_without_datetime_gets_null_time() {
        let dump = "[{'us_origen': 'user', 'mensaje': 'hi'} {'message_time': datetime.datetime(2025, 12, 4), 'us_origen': 'bot', 'mensaje': 'yo'}]";
        let records = try_parse_dump(dump).unwrap();
        assert_eq!(records[0]["message_time"], Value::Null);
        assert!(records[1]["message_time"].is_i64());
    }
}
