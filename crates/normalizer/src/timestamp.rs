//! Timestamp parsing for heterogeneous upstream records.
//!
//! Upstream payloads carry timestamps as calendar strings, epoch integers,
//! or a positional numeric tuple (`"2025, 12, 4, 0, 50, 54, 884000"`)
//! left over from the legacy dump format. A message is never dropped for an
//! unparseable timestamp; the caller substitutes the current time instead.

use std::sync::OnceLock;

use {
    chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc},
    regex::Regex,
    serde_json::Value,
};

/// Epoch values at or above this are taken as milliseconds, below as seconds.
const EPOCH_MILLIS_FLOOR: i64 = 100_000_000_000;

#[allow(clippy::expect_used)]
fn tuple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(\d{4}),\s*(\d{1,2}),\s*(\d{1,2})(?:,\s*(\d{1,2}))?(?:,\s*(\d{1,2}))?(?:,\s*(\d{1,2}))?(?:,\s*(\d+))?,?\s*$",
        )
        .expect("tuple regex is valid")
    })
}

/// Parse a raw timestamp value into epoch milliseconds (UTC).
pub fn parse_timestamp_ms(ts: &Value) -> Option<i64> {
    match ts {
        Value::Null => None,
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(epoch_to_ms),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn epoch_to_ms(v: i64) -> i64 {
    if v.abs() >= EPOCH_MILLIS_FLOOR {
        v
    } else {
        v * 1000
    }
}

fn parse_timestamp_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }

    // Common calendar shapes without an explicit offset; assumed UTC.
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }

    if let Ok(epoch) = s.parse::<i64>() {
        return Some(epoch_to_ms(epoch));
    }

    parse_numeric_tuple(s)
}

/// Positional tuple: year, month, day[, hour[, minute[, second[, micros]]]].
/// Missing trailing fields default to zero.
fn parse_numeric_tuple(s: &str) -> Option<i64> {
    let caps = tuple_re().captures(s)?;
    let field = |i: usize| -> i64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    datetime_from_parts(
        field(1),
        field(2) as u32,
        field(3) as u32,
        field(4) as u32,
        field(5) as u32,
        field(6) as u32,
        field(7),
    )
}

/// Build epoch millis from calendar parts, UTC. Returns `None` for
/// out-of-range values.
pub fn datetime_from_parts(
    year: i64,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    micros: i64,
) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
    let naive = date.and_hms_opt(hour, minute, second)?;
    let dt = naive.and_utc() + TimeDelta::microseconds(micros);
    Some(dt.timestamp_millis())
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parses_rfc3339() {
        let ms = parse_timestamp_ms(&json!("2025-12-04T00:50:54.884Z")).unwrap();
        assert_eq!(ms, 1764809454884);
    }

    #[test]
    fn parses_space_separated_without_offset_as_utc() {
        let ms = parse_timestamp_ms(&json!("2025-12-04 00:50:54.884")).unwrap();
        assert_eq!(ms, 1764809454884);
    }

    #[test]
    fn parses_date_only() {
        let ms = parse_timestamp_ms(&json!("2025-12-04")).unwrap();
        assert_eq!(ms % 1000, 0);
        assert_eq!(ms, 1764806400000);
    }

    #[test]
    fn parses_numeric_tuple_full() {
        let ms = parse_timestamp_ms(&json!("2025, 12, 4, 0, 50, 54, 884000")).unwrap();
        assert_eq!(ms, 1764809454884);
    }

    #[test]
    fn numeric_tuple_missing_trailing_fields_default_to_zero() {
        let ms = parse_timestamp_ms(&json!("2025, 12, 4")).unwrap();
        assert_eq!(ms, parse_timestamp_ms(&json!("2025-12-04")).unwrap());
    }

    #[test]
    fn parses_epoch_millis_and_seconds() {
        assert_eq!(
            parse_timestamp_ms(&json!(1764809454884i64)),
            Some(1764809454884)
        );
        assert_eq!(
            parse_timestamp_ms(&json!(1764809454i64)),
            Some(1764809454000)
        );
        assert_eq!(
            parse_timestamp_ms(&json!("1764809454884")),
            Some(1764809454884)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp_ms(&Value::Null), None);
        assert_eq!(parse_timestamp_ms(&json!("not a date")), None);
        assert_eq!(parse_timestamp_ms(&json!({"nested": true})), None);
    }

    #[test]
    fn rejects_out_of_range_tuple() {
        assert_eq!(parse_timestamp_ms(&json!("2025, 13, 4, 0, 0, 0, 0")), None);
    }
}
