//! Relation reconstruction.
//!
//! Relations are stored flattened: a relation document embeds a
//! `connections` list of role-tagged endpoint descriptors, in whatever
//! order the ingestion path produced. Reading a relation back requires
//! re-deriving the canonical source and target from the role suffixes,
//! never from list positions.

use serde_json::Value;
use stixdex_store::Document;

use crate::error::{Error, Result};

/// Role suffix of the source endpoint.
pub const ROLE_FROM_SUFFIX: &str = "_from";
/// Role suffix of the target endpoint.
pub const ROLE_TO_SUFFIX: &str = "_to";

/// One endpoint of a stored relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationEndpoint {
    pub internal_id: String,
    pub role: String,
    pub types: Vec<String>,
}

/// Parse the `connections` attribute of a relation document.
pub fn connections_of(doc: &Document) -> Result<Vec<RelationEndpoint>> {
    let raw = doc.get("connections").ok_or_else(|| {
        Error::RelationRebuild(format!("relation {} has no connections", doc.id))
    })?;
    let items = raw.as_array().ok_or_else(|| {
        Error::RelationRebuild(format!("relation {} connections is not a list", doc.id))
    })?;
    items
        .iter()
        .map(|item| {
            let obj = item.as_object().ok_or_else(|| {
                Error::RelationRebuild(format!("relation {} has a malformed connection", doc.id))
            })?;
            let internal_id = obj
                .get("internal_id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::RelationRebuild(format!(
                        "relation {} has a connection without internal_id",
                        doc.id
                    ))
                })?
                .to_string();
            let role = obj
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let types = obj
                .get("types")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            Ok(RelationEndpoint { internal_id, role, types })
        })
        .collect()
}

/// Derive `fromId`/`fromRole`/`toId`/`toRole` from the stored
/// connection list, leaving every other attribute untouched.
///
/// N-ary relations carry more than two connections; the primary
/// direction is the first `_from`/`_to` pair. A missing directional
/// role is a data corruption and fails loudly.
pub fn rebuild_relation(mut doc: Document) -> Result<Document> {
    let connections = connections_of(&doc)?;
    let from = connections
        .iter()
        .find(|c| c.role.ends_with(ROLE_FROM_SUFFIX))
        .ok_or_else(|| {
            Error::RelationRebuild(format!("relation {} has no source role", doc.id))
        })?;
    let to = connections
        .iter()
        .find(|c| c.role.ends_with(ROLE_TO_SUFFIX))
        .ok_or_else(|| {
            Error::RelationRebuild(format!("relation {} has no target role", doc.id))
        })?;

    doc.fields.insert("fromId".to_string(), Value::String(from.internal_id.clone()));
    doc.fields.insert("fromRole".to_string(), Value::String(from.role.clone()));
    doc.fields.insert("fromType".to_string(), first_type(&from.types));
    doc.fields.insert("toId".to_string(), Value::String(to.internal_id.clone()));
    doc.fields.insert("toRole".to_string(), Value::String(to.role.clone()));
    doc.fields.insert("toType".to_string(), first_type(&to.types));
    Ok(doc)
}

fn first_type(types: &[String]) -> Value {
    types.first().map(|t| Value::String(t.clone())).unwrap_or(Value::Null)
}
