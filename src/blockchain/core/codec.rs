//! Canonical byte encoding of a block's signable content.
//!
//! The encoding is the JSON text Python's `json.dumps(obj, sort_keys=True)`
//! produces: keys sorted at every level, `", "` and `": "` separators,
//! everything outside printable ASCII escaped as `\uXXXX`, and floats in
//! `repr` form. Chains written by other implementations of the ledger
//! therefore hash identically. `hash` and `signature` are never part of it.

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Borrowed view of the signable fields, minus the nonce.
#[derive(Debug, Clone, Copy)]
pub struct SignableFields<'a> {
    pub index: u64,
    pub timestamp: &'a str,
    pub incident_id: &'a str,
    pub data: &'a Value,
    pub previous_hash: &'a str,
}

/// Canonical encoding split around the nonce digits.
///
/// Sorted top-level keys are `data, incident_id, index, nonce,
/// previous_hash, timestamp`, so everything but the nonce is fixed while
/// mining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTemplate {
    prefix: String,
    suffix: String,
}

impl CanonicalTemplate {
    pub fn new(fields: &SignableFields<'_>) -> Self {
        let mut prefix = String::with_capacity(256);
        prefix.push_str("{\"data\": ");
        write_value(&mut prefix, fields.data);
        prefix.push_str(", \"incident_id\": ");
        write_str(&mut prefix, fields.incident_id);
        let _ = write!(prefix, ", \"index\": {}, \"nonce\": ", fields.index);

        let mut suffix = String::with_capacity(96);
        suffix.push_str(", \"previous_hash\": ");
        write_str(&mut suffix, fields.previous_hash);
        suffix.push_str(", \"timestamp\": ");
        write_str(&mut suffix, fields.timestamp);
        suffix.push('}');

        CanonicalTemplate { prefix, suffix }
    }

    pub fn prefix(&self) -> &[u8] {
        self.prefix.as_bytes()
    }

    pub fn suffix(&self) -> &[u8] {
        self.suffix.as_bytes()
    }

    pub fn bytes_with_nonce(&self, nonce: u64) -> Vec<u8> {
        let mut out = String::with_capacity(self.prefix.len() + self.suffix.len() + 20);
        out.push_str(&self.prefix);
        let _ = write!(out, "{}", nonce);
        out.push_str(&self.suffix);
        out.into_bytes()
    }

    /// SHA-256 state already fed with the prefix, cloned per nonce attempt.
    pub fn prefix_hasher(&self) -> Sha256 {
        Sha256::new_with_prefix(self.prefix.as_bytes())
    }
}

pub fn canonical_bytes(fields: &SignableFields<'_>, nonce: u64) -> Vec<u8> {
    CanonicalTemplate::new(fields).bytes_with_nonce(nonce)
}

/// Lowercase hex SHA-256 of the canonical bytes.
pub fn hash_hex(fields: &SignableFields<'_>, nonce: u64) -> String {
    hex::encode(Sha256::digest(canonical_bytes(fields, nonce)))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_str(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sort explicitly: serde_json's map keeps insertion order when
            // `preserve_order` is enabled anywhere in the dependency graph.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_str(out, key);
                out.push_str(": ");
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

/// Integers keep every digit, as Python's unbounded `int` does. Relies on
/// serde_json's `arbitrary_precision` keeping the source text of numbers.
fn write_number(out: &mut String, n: &Number) {
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{}", u);
        return;
    }
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{}", i);
        return;
    }

    let text = n.to_string();
    let digits = text.strip_prefix('-').unwrap_or(&text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        out.push_str(&text);
        return;
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_infinite() => {
            out.push_str(if f.is_sign_negative() { "-Infinity" } else { "Infinity" })
        }
        Ok(f) => write_float(out, f),
        Err(_) => out.push_str(&text),
    }
}

fn write_str(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}

/// Python `float.__repr__`: shortest round-trip digits, positional for
/// decimal exponents in `-4..16`, otherwise `d.ddde+XX`.
fn write_float(out: &mut String, value: f64) {
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if value.is_sign_negative() {
        out.push('-');
    }

    if (-4..16).contains(&exponent) {
        let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
        if exponent >= 0 {
            let int_len = exponent as usize + 1;
            if digits.len() <= int_len {
                out.push_str(&digits);
                out.extend(std::iter::repeat('0').take(int_len - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        } else {
            out.push_str("0.");
            out.extend(std::iter::repeat('0').take((-exponent - 1) as usize));
            out.push_str(&digits);
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        let _ = write!(out, "{}e{}{:02}", mantissa, sign, exponent.abs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields<'a>(data: &'a Value, previous_hash: &'a str) -> SignableFields<'a> {
        SignableFields {
            index: 1,
            timestamp: "2024-03-05 14:22:09",
            incident_id: "1",
            data,
            previous_hash,
        }
    }

    fn float_repr(value: f64) -> String {
        let mut out = String::new();
        write_float(&mut out, value);
        out
    }

    #[test]
    fn test_matches_python_json_dumps_sort_keys() {
        let data = json!({
            "type": "fire_accident",
            "message": "Smoke near caf\u{e9} \u{1F525}\n\"exit\" blocked",
            "location": {"lat": 12.9716, "lon": 77.5946},
            "severity": 3,
            "tiny": 1e-05,
            "big": 1e16,
            "whole": 2.0,
            "flags": [true, null, false],
            "del": "\u{7f}"
        });
        let bytes = canonical_bytes(&fields(&data, "0000abc"), 42);
        let expected = r#"{"data": {"big": 1e+16, "del": "\u007f", "flags": [true, null, false], "location": {"lat": 12.9716, "lon": 77.5946}, "message": "Smoke near caf\u00e9 \ud83d\udd25\n\"exit\" blocked", "severity": 3, "tiny": 1e-05, "type": "fire_accident", "whole": 2.0}, "incident_id": "1", "index": 1, "nonce": 42, "previous_hash": "0000abc", "timestamp": "2024-03-05 14:22:09"}"#;
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
        assert_eq!(
            hash_hex(&fields(&data, "0000abc"), 42),
            "df1514ecd26e5b7594d4c40ce0d820b40b7d4b591d37a67b408e3163290a5c17"
        );
    }

    #[test]
    fn test_numbers_outside_machine_range_keep_python_form() {
        let data: Value = serde_json::from_str(
            r#"{"big": 100000000000000000000, "neg": -123456789012345678901234, "exp": 1E2, "frac": 3.8663417406742333, "zero": -0}"#,
        )
        .unwrap();
        let mut out = String::new();
        write_value(&mut out, &data);
        assert_eq!(
            out,
            r#"{"big": 100000000000000000000, "exp": 100.0, "frac": 3.8663417406742333, "neg": -123456789012345678901234, "zero": 0}"#
        );
    }

    #[test]
    fn test_genesis_hash_matches_reference() {
        let data = json!({"incident_id": "0", "data": "Genesis Block"});
        let genesis = SignableFields {
            index: 0,
            timestamp: "2024-03-05 14:22:09",
            incident_id: "0",
            data: &data,
            previous_hash: "0",
        };
        assert_eq!(
            hash_hex(&genesis, 0),
            "d3315dc30868854ff34b234354803aca108c1d29549e4f65db3602750dd56f90"
        );
    }

    #[test]
    fn test_key_order_independent() {
        let mut first = serde_json::Map::new();
        first.insert("type".into(), json!("flood"));
        first.insert("lat".into(), json!(1.5));
        first.insert("nested".into(), json!({"z": 1, "a": 2}));

        let mut second = serde_json::Map::new();
        second.insert("nested".into(), json!({"a": 2, "z": 1}));
        second.insert("lat".into(), json!(1.5));
        second.insert("type".into(), json!("flood"));

        let (first, second) = (Value::Object(first), Value::Object(second));
        assert_eq!(
            canonical_bytes(&fields(&first, "ab"), 7),
            canonical_bytes(&fields(&second, "ab"), 7)
        );
    }

    #[test]
    fn test_template_splits_at_nonce() {
        let data = json!({"k": "v"});
        let template = CanonicalTemplate::new(&fields(&data, "ff"));
        let mut joined = template.prefix().to_vec();
        joined.extend_from_slice(b"1234");
        joined.extend_from_slice(template.suffix());
        assert_eq!(joined, template.bytes_with_nonce(1234));

        let mut hasher = template.prefix_hasher();
        hasher.update(b"1234");
        hasher.update(template.suffix());
        assert_eq!(
            hex::encode(hasher.finalize()),
            hash_hex(&fields(&data, "ff"), 1234)
        );
    }

    #[test]
    fn test_control_characters_escaped() {
        let mut out = String::new();
        write_str(&mut out, "a\u{1}b\u{8}\u{c}\r\t\\");
        assert_eq!(out, r#""a\u0001b\b\f\r\t\\""#);
    }

    #[test]
    fn test_python_float_repr() {
        assert_eq!(float_repr(0.0), "0.0");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(1.5), "1.5");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(0.00012), "0.00012");
        assert_eq!(float_repr(123456789012345.6), "123456789012345.6");
        assert_eq!(float_repr(1.5e16), "1.5e+16");
        assert_eq!(float_repr(-2.5e-7), "-2.5e-07");
        assert_eq!(float_repr(1e22), "1e+22");
        assert_eq!(float_repr(0.1), "0.1");
    }

    #[test]
    fn test_negative_integers() {
        let data = json!({"offset": -42, "max": u64::MAX});
        let bytes = canonical_bytes(&fields(&data, "0"), 0);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#"{"max": 18446744073709551615, "offset": -42}"#));
    }
}
