//! C1 — Schema Inferrer.
//!
//! Classifies arbitrary JSON values: a flat shape summary plus per-string
//! value-type classification used by the correlation engine (C7) to tag
//! `CorrelationLink::value_type`. `infer_schema`/`shape_summary` are
//! consumed by the capture session materializer (C6), which attaches an
//! `InferredSchema` to each response body it captures.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Never panics or throws: any non-JSON input simply yields `None`.
pub fn safe_parse_json(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Token,
    Id,
    Cursor,
    Timestamp,
    Hash,
    Unknown,
}

/// Classification rules are checked in order on the *trimmed* input; the
/// first match wins (spec §4.1).
pub fn classify_value_type(s: &str) -> ValueType {
    let s = s.trim();

    if is_jwt_like(s) {
        return ValueType::Token;
    }
    if is_uuid_v4_ish(s) {
        return ValueType::Id;
    }
    if is_pure_hex(s) && (32..=128).contains(&s.len()) {
        return ValueType::Hash;
    }
    if is_pure_digits(s) && (10..=13).contains(&s.len()) {
        return ValueType::Timestamp;
    }
    let lower = s.to_lowercase();
    if s.len() >= 8 && contains_any(&lower, &["cursor", "page", "next", "offset"]) {
        return ValueType::Cursor;
    }
    if s.len() >= 8 && contains_any(&lower, &["token", "csrf", "xsrf", "bearer"]) {
        return ValueType::Token;
    }
    ValueType::Unknown
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn is_jwt_like(s: &str) -> bool {
    s.starts_with("eyJ") && s.split('.').count() >= 3
}

fn is_uuid_v4_ish(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 5 {
        return false;
    }
    let lens = [8, 4, 4, 4, 12];
    parts
        .iter()
        .zip(lens)
        .all(|(p, len)| p.len() == len && p.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()))
}

fn is_pure_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_pure_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// A short, human-facing shape summary: enough to show a user what an
/// endpoint's response looks like without dumping the whole body.
pub fn shape_summary(v: &Value) -> String {
    match v {
        Value::Array(a) => format!("array[{}]", a.len()),
        Value::Object(m) => {
            let keys: Vec<&str> = m.keys().take(5).map(|k| k.as_str()).collect();
            format!("object{{{}}}", keys.join(","))
        }
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Null => "null".to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferredSchema {
    pub summary: String,
    /// path -> type tag, flattened (e.g. "data.items.0.id" -> "string")
    pub shape: std::collections::BTreeMap<String, String>,
}

/// Produce a flat `path -> type-tag` map and a shape summary. Mirrors the
/// depth/array-sampling limits used later by the correlation engine (C7),
/// so a schema inferred here stays representative of what C7 will see.
pub fn infer_schema(v: &Value) -> InferredSchema {
    let mut shape = std::collections::BTreeMap::new();
    flatten_types(v, "", 0, &mut shape);
    InferredSchema {
        summary: shape_summary(v),
        shape,
    }
}

fn flatten_types(v: &Value, prefix: &str, depth: u32, out: &mut std::collections::BTreeMap<String, String>) {
    if depth > 5 {
        return;
    }
    match v {
        Value::Object(map) => {
            for (k, val) in map.iter().take(80) {
                let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                flatten_types(val, &path, depth + 1, out);
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter().take(4).enumerate() {
                let path = format!("{prefix}.{i}");
                flatten_types(val, &path, depth + 1, out);
            }
        }
        other => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), type_tag(other));
            }
        }
    }
}

fn type_tag(v: &Value) -> String {
    match v {
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Null => "null".to_string(),
        _ => "non-json".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_is_token() {
        assert_eq!(classify_value_type("eyJhbGciOiJIUzI1NiJ9.x.y"), ValueType::Token);
    }

    #[test]
    fn uuid_is_id() {
        assert_eq!(
            classify_value_type("d290f1ee-6c54-4b01-90e6-d701748f0851"),
            ValueType::Id
        );
    }

    #[test]
    fn pure_hex_is_hash() {
        let s = "a".repeat(40);
        assert_eq!(classify_value_type(&s), ValueType::Hash);
    }

    #[test]
    fn ten_digits_is_timestamp() {
        assert_eq!(classify_value_type("1706659200"), ValueType::Timestamp);
    }

    #[test]
    fn short_digits_not_classified_as_timestamp() {
        assert_eq!(classify_value_type("123"), ValueType::Unknown);
    }

    #[test]
    fn cursor_like_string() {
        assert_eq!(classify_value_type("next_page_abcd"), ValueType::Cursor);
    }

    #[test]
    fn safe_parse_never_panics_on_garbage() {
        assert!(safe_parse_json("not json {{{").is_none());
        assert!(safe_parse_json("{\"a\":1}").is_some());
    }

    #[test]
    fn shape_summary_variants() {
        assert_eq!(shape_summary(&serde_json::json!([1, 2, 3])), "array[3]");
        assert_eq!(shape_summary(&serde_json::json!(null)), "null");
    }
}
