//! Identifier generation.
//!
//! Internal ids are opaque v4 uuids. Standard ids are deterministic:
//! the same entity type and key properties always produce the same id,
//! which is what lets independent ingestion workers converge on one
//! document per real-world entity.

use uuid::Uuid;

/// Namespace for deterministic standard ids. Changing it would change
/// every standard id on the platform.
const STANDARD_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9c, 0x1f, 0x6d, 0x2a, 0x5b, 0x1e, 0x4a, 0x0d, 0x8f, 0x3c, 0x7e, 0x21, 0x64, 0x90, 0xab,
    0x5d,
]);

/// Generate a fresh opaque internal id.
pub fn internal_id() -> String {
    Uuid::new_v4().to_string()
}

/// Derive the deterministic standard id of an entity from its type and
/// key properties.
///
/// Properties are sorted by name before hashing so callers do not have
/// to agree on an ordering.
pub fn standard_id(entity_type: &str, properties: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, &str)> = properties.to_vec();
    sorted.sort_by_key(|(k, _)| *k);
    let mut data = entity_type.to_lowercase();
    for (key, value) in sorted {
        data.push('|');
        data.push_str(key);
        data.push('=');
        data.push_str(value);
    }
    let uuid = Uuid::new_v5(&STANDARD_ID_NAMESPACE, data.as_bytes());
    format!("{}--{}", entity_type.to_lowercase(), uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_id_deterministic() {
        let a = standard_id("Malware", &[("name", "Paradise Ransomware")]);
        let b = standard_id("Malware", &[("name", "Paradise Ransomware")]);
        assert_eq!(a, b);
        assert!(a.starts_with("malware--"));
    }

    #[test]
    fn test_standard_id_property_order_irrelevant() {
        let a = standard_id("Indicator", &[("pattern", "[x]"), ("valid_from", "2024-01-01")]);
        let b = standard_id("Indicator", &[("valid_from", "2024-01-01"), ("pattern", "[x]")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_standard_id_differs_by_type_and_value() {
        let a = standard_id("Malware", &[("name", "Maze")]);
        let b = standard_id("Tool", &[("name", "Maze")]);
        let c = standard_id("Malware", &[("name", "Paradise")]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_internal_id_unique() {
        assert_ne!(internal_id(), internal_id());
    }
}
