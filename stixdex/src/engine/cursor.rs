//! Opaque pagination cursors.
//!
//! A cursor is the base64 of a JSON array holding the sort-key tuple
//! of the last emitted element. The encoding is part of the external
//! contract: cursors handed out by older versions (single-element
//! tuples under the default ordering) must keep decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::error::{Error, Result};

/// Encode a sort-key tuple into an opaque cursor.
pub fn encode_cursor(key: &[Value]) -> Result<String> {
    let bytes = serde_json::to_vec(key)?;
    Ok(STANDARD.encode(bytes))
}

/// Decode a cursor back into its sort-key tuple.
pub fn decode_cursor(cursor: &str) -> Result<Vec<Value>> {
    let bytes = STANDARD
        .decode(cursor)
        .map_err(|e| Error::Validation(format!("invalid cursor: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Validation(format!("invalid cursor payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roundtrip() {
        let key = vec![json!("2020-03-01T00:00:00.000Z"), json!("malware--abc")];
        let cursor = encode_cursor(&key).unwrap();
        assert_eq!(decode_cursor(&cursor).unwrap(), key);
    }

    #[test]
    fn test_legacy_single_element_cursor_decodes() {
        // base64(["vocabulary--fdf255a8-5f37-5fec-adfa-1df0b7d3d0ce"])
        let legacy = "WyJ2b2NhYnVsYXJ5LS1mZGYyNTVhOC01ZjM3LTVmZWMtYWRmYS0xZGYwYjdkM2QwY2UiXQ==";
        let key = decode_cursor(legacy).unwrap();
        assert_eq!(key, vec![json!("vocabulary--fdf255a8-5f37-5fec-adfa-1df0b7d3d0ce")]);
    }

    #[test]
    fn test_null_keys_survive_roundtrip() {
        let key = vec![Value::Null, json!("indicator--x")];
        let cursor = encode_cursor(&key).unwrap();
        assert_eq!(decode_cursor(&cursor).unwrap(), key);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_cursor("not-base64!!!").is_err());
        let not_json = STANDARD.encode(b"plain text");
        assert!(decode_cursor(&not_json).is_err());
    }
}
