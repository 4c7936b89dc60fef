//! Backend-agnostic query predicate tree.
//!
//! The engine compiles filter groups, free-text searches and access
//! restrictions into this representation; a backend then either
//! renders it to its native query DSL or, like [`crate::MemoryStore`],
//! evaluates it directly. Keeping the tree backend-agnostic is what
//! lets the same callers target a search engine today and a different
//! storage engine later.

use crate::analysis::{contains_phrase, tokenize};
use crate::document::{parse_datetime, Document};
use crate::traits::Hit;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Query predicate node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Match every document
    MatchAll,

    /// Exact (keyword) equality against a field value
    Term { field: String, value: Value },

    /// Analyzed match: any query token occurs in the field
    Match { field: Option<String>, query: String },

    /// Analyzed phrase: query tokens occur consecutively
    Phrase { field: Option<String>, query: String },

    /// Range comparison, numeric or date depending on the operands
    Range { field: String, bounds: RangeBounds },

    /// Field present with a non-empty value
    Exists { field: String },

    /// Field absent or empty
    Missing { field: String },

    /// Exact equality against any field whose name matches a `*` glob,
    /// e.g. `rel_*.internal_id` for the wildcard relation key
    FieldPattern { pattern: String, value: Value },

    /// Every value of the field is contained in the allowed set;
    /// vacuously true when the field is absent
    AllIn { field: String, values: Vec<Value> },

    /// Any element of a list-of-objects attribute satisfies the inner
    /// predicate
    Nested { path: String, predicate: Box<Predicate> },

    /// Conjunction
    And(Vec<Predicate>),

    /// Disjunction
    Or(Vec<Predicate>),

    /// Negation
    Not(Box<Predicate>),
}

/// Bounds of a [`Predicate::Range`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
}

impl RangeBounds {
    pub fn gt(value: impl Into<Value>) -> Self {
        Self { gt: Some(value.into()), ..Default::default() }
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self { gte: Some(value.into()), ..Default::default() }
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self { lt: Some(value.into()), ..Default::default() }
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self { lte: Some(value.into()), ..Default::default() }
    }

    pub fn and_lt(mut self, value: impl Into<Value>) -> Self {
        self.lt = Some(value.into());
        self
    }

    pub fn and_lte(mut self, value: impl Into<Value>) -> Self {
        self.lte = Some(value.into());
        self
    }
}

impl Predicate {
    /// Exact keyword equality.
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Term { field: field.into(), value: value.into() }
    }

    /// Analyzed match on a single field.
    pub fn match_field(field: impl Into<String>, query: impl Into<String>) -> Self {
        Predicate::Match { field: Some(field.into()), query: query.into() }
    }

    /// Analyzed match across every text attribute.
    pub fn match_any(query: impl Into<String>) -> Self {
        Predicate::Match { field: None, query: query.into() }
    }

    /// Phrase match across every text attribute.
    pub fn phrase_any(query: impl Into<String>) -> Self {
        Predicate::Phrase { field: None, query: query.into() }
    }

    pub fn range(field: impl Into<String>, bounds: RangeBounds) -> Self {
        Predicate::Range { field: field.into(), bounds }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Predicate::Exists { field: field.into() }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Predicate::Missing { field: field.into() }
    }

    pub fn field_pattern(pattern: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::FieldPattern { pattern: pattern.into(), value: value.into() }
    }

    pub fn all_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::AllIn { field: field.into(), values }
    }

    pub fn nested(path: impl Into<String>, predicate: Predicate) -> Self {
        Predicate::Nested { path: path.into(), predicate: Box::new(predicate) }
    }

    /// Conjunction of a set of predicates, flattened when trivial.
    pub fn all(mut predicates: Vec<Predicate>) -> Self {
        match predicates.len() {
            0 => Predicate::MatchAll,
            1 => predicates.remove(0),
            _ => Predicate::And(predicates),
        }
    }

    /// Disjunction of a set of predicates, flattened when trivial.
    pub fn any(mut predicates: Vec<Predicate>) -> Self {
        match predicates.len() {
            0 => Predicate::MatchAll,
            1 => predicates.remove(0),
            _ => Predicate::Or(predicates),
        }
    }

    /// Combine with AND.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut nodes) => {
                nodes.push(other);
                Predicate::And(nodes)
            }
            Predicate::MatchAll => other,
            _ => Predicate::And(vec![self, other]),
        }
    }

    /// Combine with OR.
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut nodes) => {
                nodes.push(other);
                Predicate::Or(nodes)
            }
            _ => Predicate::Or(vec![self, other]),
        }
    }

    /// Negate.
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluate the predicate against a document.
    pub fn matches_doc(&self, doc: &Document) -> bool {
        self.matches_scope(&Scope::Doc(&doc.fields))
    }

    fn matches_scope(&self, scope: &Scope<'_>) -> bool {
        match self {
            Predicate::MatchAll => true,
            Predicate::Term { field, value } => scope
                .get(field)
                .map(|v| value_contains(v, value))
                .unwrap_or(false),
            Predicate::Match { field, query } => {
                let query_tokens = tokenize(query);
                if query_tokens.is_empty() {
                    return false;
                }
                scope.texts(field.as_deref()).iter().any(|text| {
                    let tokens = tokenize(text);
                    query_tokens.iter().any(|t| tokens.contains(t))
                })
            }
            Predicate::Phrase { field, query } => {
                let phrase = tokenize(query);
                scope
                    .texts(field.as_deref())
                    .iter()
                    .any(|text| contains_phrase(&tokenize(text), &phrase))
            }
            Predicate::Range { field, bounds } => scope
                .get(field)
                .map(|v| scalars(v).iter().any(|s| in_bounds(s, bounds)))
                .unwrap_or(false),
            Predicate::Exists { field } => scope.get(field).map(is_present).unwrap_or(false),
            Predicate::Missing { field } => !scope.get(field).map(is_present).unwrap_or(false),
            Predicate::FieldPattern { pattern, value } => scope
                .entries()
                .any(|(name, v)| glob_match(pattern, name) && value_contains(v, value)),
            Predicate::AllIn { field, values } => match scope.get(field) {
                None | Some(Value::Null) => true,
                Some(v) => scalars(v)
                    .iter()
                    .all(|s| values.iter().any(|allowed| scalar_eq(s, allowed))),
            },
            Predicate::Nested { path, predicate } => match scope.get(path) {
                Some(Value::Array(items)) => items.iter().any(|item| match item {
                    Value::Object(obj) => predicate.matches_scope(&Scope::Obj(obj)),
                    _ => false,
                }),
                _ => false,
            },
            Predicate::And(nodes) => nodes.iter().all(|n| n.matches_scope(scope)),
            Predicate::Or(nodes) => nodes.iter().any(|n| n.matches_scope(scope)),
            Predicate::Not(inner) => !inner.matches_scope(scope),
        }
    }
}

/// Evaluation scope: either a full document or a nested object.
enum Scope<'a> {
    Doc(&'a HashMap<String, Value>),
    Obj(&'a Map<String, Value>),
}

impl<'a> Scope<'a> {
    fn get(&self, path: &str) -> Option<&'a Value> {
        let (direct, first_step) = match self {
            Scope::Doc(fields) => (
                fields.get(path),
                path.split('.').next().and_then(|p| fields.get(p)),
            ),
            Scope::Obj(obj) => (
                obj.get(path),
                path.split('.').next().and_then(|p| obj.get(p)),
            ),
        };
        if direct.is_some() {
            return direct;
        }
        let mut current = first_step?;
        for part in path.split('.').skip(1) {
            current = match current {
                Value::Object(obj) => obj.get(part)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = (&'a str, &'a Value)> + '_> {
        match self {
            Scope::Doc(fields) => Box::new(fields.iter().map(|(k, v)| (k.as_str(), v))),
            Scope::Obj(obj) => Box::new(obj.iter().map(|(k, v)| (k.as_str(), v))),
        }
    }

    /// Text content of one field, or of the whole scope when `field`
    /// is `None` (free-text search).
    fn texts(&self, field: Option<&str>) -> Vec<&'a str> {
        let mut out = Vec::new();
        match field {
            Some(f) => {
                if let Some(v) = self.get(f) {
                    collect_texts(v, &mut out);
                }
            }
            None => {
                for (_, v) in self.entries() {
                    collect_texts(v, &mut out);
                }
            }
        }
        out
    }
}

fn collect_texts<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s.as_str()),
        Value::Array(items) => items.iter().for_each(|v| collect_texts(v, out)),
        Value::Object(obj) => obj.values().for_each(|v| collect_texts(v, out)),
        _ => {}
    }
}

/// Scalar views of a value: arrays flatten one level.
fn scalars(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// True when any scalar of `doc_value` equals `wanted`.
fn value_contains(doc_value: &Value, wanted: &Value) -> bool {
    scalars(doc_value).iter().any(|s| scalar_eq(s, wanted))
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn in_bounds(value: &Value, bounds: &RangeBounds) -> bool {
    let check = |bound: &Option<Value>, ok: fn(Ordering) -> bool| -> bool {
        match bound {
            None => true,
            Some(b) => compare_scalars(value, b).map(ok).unwrap_or(false),
        }
    };
    check(&bounds.gt, Ordering::is_gt)
        && check(&bounds.gte, Ordering::is_ge)
        && check(&bounds.lt, Ordering::is_lt)
        && check(&bounds.lte, Ordering::is_le)
}

/// Compare two scalar values, date-aware for string timestamps.
pub fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return Some(x.total_cmp(&y));
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        if let (Some(dx), Some(dy)) = (parse_datetime(x), parse_datetime(y)) {
            return Some(dx.cmp(&dy));
        }
        return Some(x.cmp(y));
    }
    None
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Match a field name against a `*` glob pattern.
fn glob_match(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == name;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = name;
    if !rest.starts_with(parts[0]) {
        return false;
    }
    rest = &rest[parts[0].len()..];
    for (i, part) in parts.iter().enumerate().skip(1) {
        if part.is_empty() {
            continue;
        }
        if i == parts.len() - 1 {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

/// One element of a composite sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Desc }
    }
}

/// Extract the sort-key tuple of a document; missing values become
/// `null` so tuples stay positional across documents.
pub fn sort_key(doc: &Document, specs: &[SortSpec]) -> Vec<Value> {
    specs
        .iter()
        .map(|spec| doc.get(&spec.field).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Composite ordering over sort-key tuples.
///
/// Missing (`null`) values sort last in both directions so paginated
/// windows never interleave documents lacking the order field with
/// documents carrying it.
pub fn cmp_sort_keys(a: &[Value], b: &[Value], specs: &[SortSpec]) -> Ordering {
    for (i, spec) in specs.iter().enumerate() {
        let (va, vb) = (a.get(i).unwrap_or(&Value::Null), b.get(i).unwrap_or(&Value::Null));
        let ord = match (va, vb) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (x, y) => {
                let natural = compare_scalars(x, y)
                    .unwrap_or_else(|| type_rank(x).cmp(&type_rank(y)).then_with(|| x.to_string().cmp(&y.to_string())));
                match spec.order {
                    SortOrder::Asc => natural,
                    SortOrder::Desc => natural.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// A store search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub predicate: Predicate,
    pub sort: Vec<SortSpec>,
    pub search_after: Option<Vec<Value>>,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate, sort: Vec::new(), search_after: None, limit: None }
    }

    pub fn sorted(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn after(mut self, key: Option<Vec<Value>>) -> Self {
        self.search_after = key;
        self
    }

    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A store search response.
///
/// `total` counts every match independent of `limit`.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Document {
        Document::new("d1")
            .with("entity_type", "Marking-Definition")
            .with("parent_types", json!(["Stix-Meta-Object", "Basic-Object"]))
            .with("definition", "TLP:RED")
            .with("x_stixdex_color", "#c62828")
            .with("created", "2020-02-24T09:00:00.000Z")
            .with("confidence", 75)
            .with("rel_object-label.internal_id", json!(["l1", "l2"]))
            .with(
                "connections",
                json!([
                    {"internal_id": "c1", "role": "uses_from", "types": ["Malware"]},
                    {"internal_id": "c2", "role": "uses_to", "types": ["Attack-Pattern"]}
                ]),
            )
    }

    #[test]
    fn test_term_is_exact() {
        assert!(Predicate::term("definition", "TLP:RED").matches_doc(&doc()));
        assert!(!Predicate::term("definition", "tlp:red").matches_doc(&doc()));
        assert!(Predicate::term("parent_types", "Basic-Object").matches_doc(&doc()));
    }

    #[test]
    fn test_match_is_analyzed() {
        assert!(Predicate::match_field("entity_type", "marking").matches_doc(&doc()));
        assert!(!Predicate::term("entity_type", "marking").matches_doc(&doc()));
    }

    #[test]
    fn test_range_on_dates_and_numbers() {
        let p = Predicate::range("created", RangeBounds::gte("2020-01-01"));
        assert!(p.matches_doc(&doc()));
        let p = Predicate::range("created", RangeBounds::lt("2020-01-01"));
        assert!(!p.matches_doc(&doc()));
        let p = Predicate::range("confidence", RangeBounds::gt(50).and_lte(75));
        assert!(p.matches_doc(&doc()));
    }

    #[test]
    fn test_exists_and_missing() {
        assert!(Predicate::exists("x_stixdex_color").matches_doc(&doc()));
        assert!(Predicate::missing("nowhere").matches_doc(&doc()));
        let empty = Document::new("d2").with("x_stixdex_color", "");
        assert!(Predicate::missing("x_stixdex_color").matches_doc(&empty));
    }

    #[test]
    fn test_field_pattern_matches_relation_keys() {
        let p = Predicate::field_pattern("rel_*.internal_id", "l2");
        assert!(p.matches_doc(&doc()));
        let p = Predicate::field_pattern("rel_*.internal_id", "nope");
        assert!(!p.matches_doc(&doc()));
    }

    #[test]
    fn test_all_in_subset_semantics() {
        let allowed = vec![json!("l1"), json!("l2"), json!("l3")];
        assert!(Predicate::all_in("rel_object-label.internal_id", allowed).matches_doc(&doc()));
        let narrow = vec![json!("l1")];
        assert!(!Predicate::all_in("rel_object-label.internal_id", narrow).matches_doc(&doc()));
        // vacuous on absent field
        assert!(Predicate::all_in("rel_object-marking.internal_id", vec![]).matches_doc(&doc()));
    }

    #[test]
    fn test_nested_over_connections() {
        let p = Predicate::nested(
            "connections",
            Predicate::term("internal_id", "c2").and(Predicate::term("role", "uses_to")),
        );
        assert!(p.matches_doc(&doc()));
        let p = Predicate::nested(
            "connections",
            Predicate::term("internal_id", "c2").and(Predicate::term("role", "uses_from")),
        );
        assert!(!p.matches_doc(&doc()));
    }

    #[test]
    fn test_combinators_flatten() {
        let p = Predicate::term("a", 1).and(Predicate::term("b", 2)).and(Predicate::term("c", 3));
        match p {
            Predicate::And(nodes) => assert_eq!(nodes.len(), 3),
            _ => panic!("expected And"),
        }
    }

    #[test]
    fn test_sort_keys_missing_last_both_directions() {
        let specs = vec![SortSpec::asc("published"), SortSpec::asc("standard_id")];
        let with = sort_key(&Document::new("a").with("published", "2020-01-01").with("standard_id", "s1"), &specs);
        let without = sort_key(&Document::new("b").with("standard_id", "s0"), &specs);
        assert_eq!(cmp_sort_keys(&with, &without, &specs), Ordering::Less);

        let specs_desc = vec![SortSpec::desc("published"), SortSpec::asc("standard_id")];
        assert_eq!(cmp_sort_keys(&with, &without, &specs_desc), Ordering::Less);
    }

    #[test]
    fn test_cmp_sort_keys_date_aware() {
        let specs = vec![SortSpec::asc("created")];
        let a = vec![json!("2020-03-01T00:00:00Z")];
        let b = vec![json!("2020-03-01T00:00:00.100Z")];
        assert_eq!(cmp_sort_keys(&a, &b, &specs), Ordering::Less);
    }
}
