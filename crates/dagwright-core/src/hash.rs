//! Canonical JSON and truncated SHA-256 digests used for node and
//! delegation hashes.
//!
//! Canonical form has object keys sorted at every depth, `", "` and `": "`
//! separators, and every non-ASCII character escaped as `\uXXXX`. This is
//! byte-for-byte what Python's `json.dumps(value, sort_keys=True)` emits, so
//! digests agree with audit records produced by Python tooling.
//! Digests are the first 16 hex characters of SHA-256 over that form; they
//! identify content for audit display and are not commitments.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Hex characters kept from the full digest.
pub const DIGEST_LEN: usize = 16;

/// Recursively rebuild `value` with object keys in sorted order.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Separators and string escaping of Python's default `json.dumps`.
struct PythonStyle;

impl Formatter for PythonStyle {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    // Quotes, backslashes and C0 controls never reach here; serde_json
    // escapes those itself with the same spellings Python uses.
    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() && c != '\x7f' {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serialize `value` to canonical JSON.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = sort_keys(&serde_json::to_value(value)?);
    let mut buf = Vec::new();
    value.serialize(&mut Serializer::with_formatter(&mut buf, PythonStyle))?;
    let json = String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(json)
}

/// Truncated SHA-256 of raw bytes.
pub fn digest16_bytes(bytes: &[u8]) -> String {
    let full = hex::encode(Sha256::digest(bytes));
    full[..DIGEST_LEN].to_string()
}

/// Truncated SHA-256 of the canonical JSON form of `value`.
pub fn digest16<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(digest16_bytes(canonical_json(value)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_digest() {
        let mut a = Map::new();
        a.insert("zeta".into(), json!(1));
        a.insert("alpha".into(), json!({"y": 2, "b": [3, {"k": 1, "a": 0}]}));
        let mut b = Map::new();
        b.insert("alpha".into(), json!({"b": [3, {"a": 0, "k": 1}], "y": 2}));
        b.insert("zeta".into(), json!(1));

        assert_eq!(digest16(&a).unwrap(), digest16(&b).unwrap());
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn canonical_form_is_sorted_with_python_separators() {
        let v = json!({"b": 1, "a": [true, null], "c": {}});
        assert_eq!(canonical_json(&v).unwrap(), r#"{"a": [true, null], "b": 1, "c": {}}"#);
    }

    #[test]
    fn non_ascii_is_escaped_as_utf16_units() {
        let v = json!({"z": "\u{1F600}", "a": ["\u{e9}", "\u{7f}\n\"q\""]});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"a": ["\u00e9", "\u007f\n\"q\""], "z": "\ud83d\ude00"}"#
        );
    }

    #[test]
    fn delegation_rules_match_python_digest() {
        // hashlib.sha256(json.dumps(rules, sort_keys=True).encode()).hexdigest()[:16]
        let rules = json!({
            "proposal": "governance_agent",
            "vote": "governance_agent",
            "data": "analytics_agent",
            "report": "analytics_agent",
        });
        assert_eq!(digest16(&rules).unwrap(), "b5b07ff01d1191d3");
    }

    #[test]
    fn digest_is_sixteen_hex_chars() {
        let d = digest16(&json!({"x": "y"})).unwrap();
        assert_eq!(d.len(), DIGEST_LEN);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn known_vector() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(digest16_bytes(b"abc"), "ba7816bf8f01cfea");
    }
}
