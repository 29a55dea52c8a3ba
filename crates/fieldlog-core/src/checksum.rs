//! Content checksums for echo matching.

use serde::Serialize;

use crate::errors::FieldlogResult;

/// blake3 over the JSON encoding. `serde_json` maps are key-sorted, so equal
/// values always produce equal checksums.
pub fn content_checksum<T: Serialize>(value: &T) -> FieldlogResult<String> {
    let canonical = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_checksum() {
        let a = json!({"a": 1, "b": [1, 2], "c": {"x": true, "y": null}});
        let b: serde_json::Value =
            serde_json::from_str(r#"{"c": {"y": null, "x": true}, "b": [1, 2], "a": 1}"#).unwrap();
        assert_eq!(content_checksum(&a).unwrap(), content_checksum(&b).unwrap());
    }

    #[test]
    fn different_content_differs() {
        let a = content_checksum(&json!({"amount": 10})).unwrap();
        let b = content_checksum(&json!({"amount": 11})).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
