//! Value Codec
//!
//! The contract stores arbitrary JSON-representable values. At the boundary
//! they are [`serde_json::Value`]; inside a backend they become whatever that
//! backend can hold natively (text for memory, Redis, and Postgres; BSON for
//! Mongo).
//!
//! ## Passthrough rules
//!
//! Plain strings and numbers are stored in their raw textual form instead of
//! as JSON literals:
//!
//! - `Value::String("alice")` encodes to `alice`, not `"alice"`
//! - `Value::Number(42)` encodes to `42`
//! - everything else encodes to compact JSON text
//!
//! Decoding is the mirror image: text that parses as JSON comes back as the
//! parsed value, anything else comes back as a string. The practical
//! consequence is that a stored string which happens to look like a number
//! decodes as a number. Round-trip fidelity is guaranteed only within that
//! serialization boundary, and the passthrough form is what lets a stored
//! counter be incremented natively by backends that operate on raw text.

use crate::error::{StoreError, StoreResult};

pub use serde_json::Value;

/// Encode a value to its stored textual form.
///
/// Strings pass through raw; everything else becomes compact JSON.
pub fn encode(value: &Value) -> StoreResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string(other).map_err(|e| StoreError::codec(e.to_string())),
    }
}

/// Decode a stored textual form back into a value.
///
/// Text that parses as JSON yields the parsed value; anything else yields a
/// plain string.
pub fn decode(raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => Value::String(raw.to_string()),
    }
}

/// Interpret a stored textual form as an integer for increment operations.
///
/// Only integral text is accepted. Floats and non-numeric text fail, matching
/// the strictest native backend (`INCRBY`).
pub fn coerce_i64(raw: &str, target: &str) -> StoreResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| StoreError::not_numeric(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_passthrough() {
        let encoded = encode(&json!("alice")).unwrap();
        assert_eq!(encoded, "alice");
    }

    #[test]
    fn test_number_encodes_raw() {
        assert_eq!(encode(&json!(42)).unwrap(), "42");
        assert_eq!(encode(&json!(1.5)).unwrap(), "1.5");
    }

    #[test]
    fn test_structures_encode_as_json() {
        let encoded = encode(&json!({"points": 100})).unwrap();
        assert_eq!(decode(&encoded), json!({"points": 100}));

        let encoded = encode(&json!([1, 2, 3])).unwrap();
        assert_eq!(decode(&encoded), json!([1, 2, 3]));
    }

    #[test]
    fn test_decode_fallback_to_string() {
        assert_eq!(decode("not json at all"), json!("not json at all"));
    }

    #[test]
    fn test_numeric_looking_string_decodes_as_number() {
        // The documented boundary of the passthrough rules.
        let encoded = encode(&json!("123")).unwrap();
        assert_eq!(decode(&encoded), json!(123));
    }

    #[test]
    fn test_coerce_i64() {
        assert_eq!(coerce_i64("42", "k").unwrap(), 42);
        assert_eq!(coerce_i64("-7", "k").unwrap(), -7);
        assert!(coerce_i64("4.5", "k").is_err());
        assert!(coerce_i64("hello", "k").is_err());
    }
}
