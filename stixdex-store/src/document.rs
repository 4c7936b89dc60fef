//! Schema-less document model.
//!
//! Platform entities carry a dynamic attribute set that varies per
//! entity type, including legacy fields surviving from older mappings,
//! so a document is a plain JSON field map with a mandatory identifier
//! rather than a fixed record type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A persisted platform document.
///
/// `id` duplicates the `internal_id` attribute and is the key every
/// store backend addresses the document by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: HashMap<String, Value>,
}

impl Document {
    /// Create an empty document with the given identifier.
    ///
    /// The `internal_id` attribute is set to match.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut fields = HashMap::new();
        fields.insert("internal_id".to_string(), Value::String(id.clone()));
        Self { id, fields }
    }

    /// Build a document from a raw JSON object.
    ///
    /// The object must carry a string `internal_id`.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        let obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(crate::StoreError::InvalidDocument(format!(
                    "expected a JSON object, got {other}"
                )))
            }
        };
        let id = obj
            .get("internal_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                crate::StoreError::InvalidDocument("missing internal_id".to_string())
            })?;
        Ok(Self {
            id,
            fields: obj.into_iter().collect(),
        })
    }

    /// Builder-style attribute insertion.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Look up an attribute value.
    ///
    /// Field names may legitimately contain dots (denormalized relation
    /// fields such as `rel_object-marking.internal_id`), so an exact
    /// key match wins over dotted-path traversal into nested objects.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.fields.get(path) {
            return Some(v);
        }
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.fields.get(first)?;
        for part in parts {
            current = lookup_step(current, part)?;
        }
        Some(current)
    }

    /// String attribute accessor.
    pub fn str_field(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Attribute as a list of strings.
    ///
    /// A scalar string is returned as a single-element list, which is
    /// how denormalized relation ids and `parent_types` are consumed.
    pub fn str_list(&self, path: &str) -> Vec<&str> {
        match self.get(path) {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Date attribute accessor, accepting any supported timestamp shape.
    pub fn date_field(&self, path: &str) -> Option<DateTime<Utc>> {
        self.str_field(path).and_then(parse_datetime)
    }

    /// Entity type of the document, if set.
    pub fn entity_type(&self) -> Option<&str> {
        self.str_field("entity_type")
    }

    /// Base type (`ENTITY` or `RELATION`), if set.
    pub fn base_type(&self) -> Option<&str> {
        self.str_field("base_type")
    }

    /// Ancestor type chain.
    pub fn parent_types(&self) -> Vec<&str> {
        self.str_list("parent_types")
    }
}

fn lookup_step<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(obj) => obj.get(key),
        _ => None,
    }
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339, a date-time without offset (assumed UTC), a plain
/// date (midnight UTC) and a year-month (first day of the month).
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}
