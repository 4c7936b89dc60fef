//! Declarative filter-group trees.
//!
//! The filter JSON is the stable contract persisted in per-view state
//! by callers and sent verbatim to the engine: a tree of groups
//! (`mode`, `filters`, `filterGroups`) whose leaves name a key, an
//! operator and values. [`compile`] turns a tree into a store
//! predicate.

mod compile;

pub use compile::compile;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Sentinel value selecting presence semantics under the `eq` operator.
pub const EXISTS_VALUE: &str = "EXISTS";

/// Boolean combination mode of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    And,
    Or,
}

/// Leaf operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Match,
    Nil,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A leaf filter.
///
/// `key` accepts a single name or a list of names in the wire format;
/// a multi-key leaf unions its per-key predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(deserialize_with = "one_or_many")]
    pub key: Vec<String>,
    #[serde(default)]
    pub operator: Option<FilterOperator>,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<Vec<NestedClause>>,
}

/// One clause of a nested filter, applied to each element of a
/// list-of-objects attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedClause {
    pub key: String,
    #[serde(default)]
    pub operator: Option<FilterOperator>,
    #[serde(default)]
    pub values: Vec<Value>,
}

/// A filter group: leaves plus nested groups under one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub mode: FilterMode,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, rename = "filterGroups")]
    pub filter_groups: Vec<FilterGroup>,
}

impl Filter {
    pub fn new(key: impl Into<String>, operator: FilterOperator, values: Vec<Value>) -> Self {
        Self { key: vec![key.into()], operator: Some(operator), values, nested: None }
    }

    /// Leaf with the default (`eq`) operator.
    pub fn eq(key: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(key, FilterOperator::Eq, values)
    }
}

impl FilterGroup {
    pub fn and(filters: Vec<Filter>) -> Self {
        Self { mode: FilterMode::And, filters, filter_groups: Vec::new() }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self { mode: FilterMode::Or, filters, filter_groups: Vec::new() }
    }

    pub fn with_group(mut self, group: FilterGroup) -> Self {
        self.filter_groups.push(group);
        self
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(key) => vec![key],
        OneOrMany::Many(keys) => keys,
    })
}
