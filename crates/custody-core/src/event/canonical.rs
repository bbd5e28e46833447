//! Canonical JSON serialization for event payloads.
//!
//! The canonical form is the byte string fed into the entry hash, so it is
//! frozen: the same logical payload must always produce the same bytes, on
//! every machine, forever.
//!
//! Rules:
//! - Compact: no whitespace between tokens.
//! - Object keys sorted lexicographically, recursively at every depth.
//! - Arrays preserve element order.
//! - Numbers, strings, booleans, and null use serde_json's formatting.

use std::collections::BTreeMap;

use serde_json::Value;

/// Produce the canonical JSON string for a [`serde_json::Value`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use custody_core::event::canonical::to_canonical_json;
///
/// let val = json!({"tags": ["a", "b"], "category": {"id": 2, "code": "x"}});
/// assert_eq!(
///     to_canonical_json(&val),
///     r#"{"category":{"code":"x","id":2},"tags":["a","b"]}"#
/// );
/// ```
#[must_use]
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Re-collect into a BTreeMap so iteration order is the sorted
            // key order regardless of how serde_json's map is configured.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, val)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(key, out);
                out.push(':');
                write_value(val, out);
            }
            out.push('}');
        }
    }
}

/// JSON-escape a string via serde_json so escaping rules stay identical to
/// everything else that reads these payloads.
fn write_escaped(s: &str, out: &mut String) {
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        // Serializing a plain string cannot fail; keep the fallback total
        // anyway so the canonicalizer itself is infallible.
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(to_canonical_json(&json!(null)), "null");
        assert_eq!(to_canonical_json(&json!(true)), "true");
        assert_eq!(to_canonical_json(&json!(false)), "false");
        assert_eq!(to_canonical_json(&json!(42)), "42");
        assert_eq!(to_canonical_json(&json!(-7)), "-7");
        assert_eq!(to_canonical_json(&json!(2.5)), "2.5");
        assert_eq!(to_canonical_json(&json!("hi")), "\"hi\"");
    }

    #[test]
    fn string_escaping_matches_serde_json() {
        assert_eq!(
            to_canonical_json(&json!("line\nbreak \"q\"")),
            r#""line\nbreak \"q\"""#
        );
    }

    #[test]
    fn keys_sorted_at_every_depth() {
        let val = json!({
            "notes": {"z": 1, "a": {"m": 2, "b": 3}},
            "category": "wildlife"
        });
        assert_eq!(
            to_canonical_json(&val),
            r#"{"category":"wildlife","notes":{"a":{"b":3,"m":2},"z":1}}"#
        );
    }

    #[test]
    fn arrays_preserve_order() {
        assert_eq!(to_canonical_json(&json!([3, 1, 2])), "[3,1,2]");
        assert_eq!(
            to_canonical_json(&json!([{"b": 1, "a": 2}])),
            r#"[{"a":2,"b":1}]"#
        );
    }

    #[test]
    fn empty_containers() {
        assert_eq!(to_canonical_json(&json!({})), "{}");
        assert_eq!(to_canonical_json(&json!([])), "[]");
    }

    #[test]
    fn compact_no_whitespace() {
        let out = to_canonical_json(&json!({"content_hash": "abc", "media_type": "video/mp4"}));
        assert!(!out.contains(' '));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn idempotent_through_reparse() {
        let val = json!({"b": [1, {"y": 2, "x": 3}], "a": null});
        let first = to_canonical_json(&val);
        let reparsed: Value = serde_json::from_str(&first).expect("parse");
        assert_eq!(first, to_canonical_json(&reparsed));
    }

    #[test]
    fn unicode_passthrough() {
        let out = to_canonical_json(&json!({"note": "日本語 🎥"}));
        assert!(out.contains("日本語"));
        assert!(out.contains("🎥"));
    }

    #[test]
    fn upload_payload_canonical_shape() {
        let val = json!({
            "media_type": "video/mp4",
            "content_hash": "9f86d08188",
            "source": "live",
            "outcome": "verified"
        });
        assert_eq!(
            to_canonical_json(&val),
            r#"{"content_hash":"9f86d08188","media_type":"video/mp4","outcome":"verified","source":"live"}"#
        );
    }
}
