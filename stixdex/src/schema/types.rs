//! Base types, index registry and per-type document validation.

use crate::error::{Error, Result};
use stixdex_store::Document;

pub const BASE_TYPE_ENTITY: &str = "ENTITY";
pub const BASE_TYPE_RELATION: &str = "RELATION";

// Logical index names. Physical indices live behind aliases managed by
// the index lifecycle manager.
pub const INDEX_INTERNAL_OBJECTS: &str = "internal_objects";
pub const INDEX_STIX_DOMAIN_OBJECTS: &str = "stix_domain_objects";
pub const INDEX_STIX_META_OBJECTS: &str = "stix_meta_objects";
pub const INDEX_INTERNAL_RELATIONSHIPS: &str = "internal_relationships";
pub const INDEX_STIX_CORE_RELATIONSHIPS: &str = "stix_core_relationships";
pub const INDEX_STIX_META_RELATIONSHIPS: &str = "stix_meta_relationships";
pub const INDEX_STIX_SIGHTING_RELATIONSHIPS: &str = "stix_sighting_relationships";
pub const INDEX_DELETED_OBJECTS: &str = "deleted_objects";

/// Every logical index the platform writes to.
pub fn write_indices() -> Vec<&'static str> {
    vec![
        INDEX_INTERNAL_OBJECTS,
        INDEX_STIX_DOMAIN_OBJECTS,
        INDEX_STIX_META_OBJECTS,
        INDEX_INTERNAL_RELATIONSHIPS,
        INDEX_STIX_CORE_RELATIONSHIPS,
        INDEX_STIX_META_RELATIONSHIPS,
        INDEX_STIX_SIGHTING_RELATIONSHIPS,
        INDEX_DELETED_OBJECTS,
    ]
}

/// Read pattern covering entity documents.
pub fn read_entities_indices() -> Vec<&'static str> {
    vec![INDEX_INTERNAL_OBJECTS, INDEX_STIX_DOMAIN_OBJECTS, INDEX_STIX_META_OBJECTS]
}

/// Read pattern covering relationship documents.
pub fn read_relationships_indices() -> Vec<&'static str> {
    vec![
        INDEX_INTERNAL_RELATIONSHIPS,
        INDEX_STIX_CORE_RELATIONSHIPS,
        INDEX_STIX_META_RELATIONSHIPS,
        INDEX_STIX_SIGHTING_RELATIONSHIPS,
    ]
}

/// Read pattern covering everything except trash.
pub fn read_data_indices() -> Vec<&'static str> {
    let mut indices = read_entities_indices();
    indices.extend(read_relationships_indices());
    indices
}

/// Logical names retired by past migrations. They must never be
/// recreated; their documents were reindexed into the current set.
pub fn deprecated_indices() -> Vec<&'static str> {
    vec!["stix_observable_relationships", "stix_entities"]
}

/// Attributes carrying timestamps. Equality filters on these degrade
/// to a range spanning the supplied day, and histogram fields are
/// expected to be one of them.
const DATE_ATTRIBUTES: &[&str] = &[
    "created",
    "modified",
    "created_at",
    "updated_at",
    "published",
    "first_seen",
    "last_seen",
    "start_time",
    "stop_time",
    "valid_from",
    "valid_until",
];

pub fn is_date_attribute(name: &str) -> bool {
    DATE_ATTRIBUTES.contains(&name)
}

/// Sort sub-field of object-valued attributes. Ordering by the bare
/// attribute name resolves through this registry; object attributes
/// without an entry cannot be sorted on.
pub fn object_sort_subfield(field: &str) -> Option<&'static str> {
    match field {
        "group_confidence_level" => Some("max_confidence"),
        _ => None,
    }
}

/// Denormalized relation-ref attribute for a relation type,
/// e.g. `rel_object-marking.internal_id`.
pub fn ref_relation_key(relation_type: &str) -> String {
    format!("rel_{relation_type}.internal_id")
}

/// Recognize a relation-ref filter key; returns the relation type,
/// `*` for the wildcard key matching any relation type.
pub fn parse_ref_relation_key(key: &str) -> Option<&str> {
    key.strip_prefix("rel_")?.strip_suffix(".internal_id")
}

/// Route a document to its logical index from `base_type` and the
/// ancestor type chain.
pub fn index_for_document(doc: &Document) -> Result<&'static str> {
    let base = doc.base_type().ok_or_else(|| {
        Error::MalformedDocument(format!("document {} has no base_type", doc.id))
    })?;
    let parents = doc.parent_types();
    let has = |t: &str| parents.iter().any(|p| p.eq_ignore_ascii_case(t));
    match base {
        BASE_TYPE_RELATION => {
            if doc.entity_type() == Some("stix-sighting-relationship") {
                Ok(INDEX_STIX_SIGHTING_RELATIONSHIPS)
            } else if has("stix-core-relationship") {
                Ok(INDEX_STIX_CORE_RELATIONSHIPS)
            } else if has("stix-ref-relationship") || has("stix-meta-relationship") {
                Ok(INDEX_STIX_META_RELATIONSHIPS)
            } else {
                Ok(INDEX_INTERNAL_RELATIONSHIPS)
            }
        }
        BASE_TYPE_ENTITY => {
            if has("Stix-Domain-Object") {
                Ok(INDEX_STIX_DOMAIN_OBJECTS)
            } else if has("Stix-Meta-Object") {
                Ok(INDEX_STIX_META_OBJECTS)
            } else {
                Ok(INDEX_INTERNAL_OBJECTS)
            }
        }
        other => Err(Error::MalformedDocument(format!(
            "document {} has unknown base_type {other}",
            doc.id
        ))),
    }
}

/// Pre-indexing validation of the attributes every document must carry.
///
/// Connection-level checks of relation documents happen in the rebuild
/// step; this guards the base contract.
pub fn validate_for_indexing(doc: &Document) -> Result<()> {
    if doc.id.is_empty() {
        return Err(Error::MalformedDocument("empty internal_id".to_string()));
    }
    if doc.entity_type().map(str::is_empty).unwrap_or(true) {
        return Err(Error::MalformedDocument(format!(
            "document {} has no entity_type",
            doc.id
        )));
    }
    let base = doc.base_type().ok_or_else(|| {
        Error::MalformedDocument(format!("document {} has no base_type", doc.id))
    })?;
    match base {
        BASE_TYPE_ENTITY => Ok(()),
        BASE_TYPE_RELATION => {
            if doc.str_field("relationship_type").map(str::is_empty).unwrap_or(true) {
                return Err(Error::MalformedDocument(format!(
                    "relation {} has no relationship_type",
                    doc.id
                )));
            }
            Ok(())
        }
        other => Err(Error::MalformedDocument(format!(
            "document {} has unknown base_type {other}",
            doc.id
        ))),
    }
}
