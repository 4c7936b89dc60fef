//! Filter-group compilation.
//!
//! Structural recursion from the declarative tree into the store's
//! predicate representation. Validation failures surface here, before
//! any store call.

use chrono::{Days, NaiveDate};
use serde_json::Value;
use stixdex_store::{Predicate, RangeBounds};

use super::{Filter, FilterGroup, FilterMode, FilterOperator, NestedClause, EXISTS_VALUE};
use crate::error::{Error, Result};
use crate::schema;

/// Compile a filter-group tree into a predicate.
pub fn compile(group: &FilterGroup) -> Result<Predicate> {
    let mut parts = Vec::with_capacity(group.filters.len() + group.filter_groups.len());
    for filter in &group.filters {
        parts.push(compile_filter(filter)?);
    }
    for sub in &group.filter_groups {
        parts.push(compile(sub)?);
    }
    Ok(match group.mode {
        FilterMode::And => Predicate::all(parts),
        FilterMode::Or => Predicate::any(parts),
    })
}

fn compile_filter(filter: &Filter) -> Result<Predicate> {
    if let Some(nested) = &filter.nested {
        if filter.key.len() != 1 {
            return Err(Error::Validation("Filter must have only one field".to_string()));
        }
        let inner = nested
            .iter()
            .map(compile_nested_clause)
            .collect::<Result<Vec<_>>>()?;
        return Ok(Predicate::nested(filter.key[0].clone(), Predicate::all(inner)));
    }

    let operator = filter.operator.unwrap_or(FilterOperator::Eq);
    let per_key = filter
        .key
        .iter()
        .map(|key| compile_leaf(key, operator, &filter.values))
        .collect::<Result<Vec<_>>>()?;
    Ok(Predicate::any(per_key))
}

fn compile_nested_clause(clause: &NestedClause) -> Result<Predicate> {
    compile_leaf(&clause.key, clause.operator.unwrap_or(FilterOperator::Eq), &clause.values)
}

fn compile_leaf(key: &str, operator: FilterOperator, values: &[Value]) -> Result<Predicate> {
    if operator == FilterOperator::Nil {
        if schema::parse_ref_relation_key(key) == Some("*") {
            return Err(Error::Validation(
                "nil is not supported on the wildcard relation key".to_string(),
            ));
        }
        return Ok(Predicate::missing(key));
    }

    if values.iter().any(|v| v.as_str() == Some(EXISTS_VALUE)) {
        return Ok(Predicate::exists(key));
    }

    if values.is_empty() {
        return Err(Error::Validation(format!(
            "Filter on key {key} requires at least one value"
        )));
    }

    // Relation-ref keys match denormalized id lists; the wildcard key
    // matches the id under any relation type.
    if let Some(relation_type) = schema::parse_ref_relation_key(key) {
        let per_value = values
            .iter()
            .map(|v| {
                if relation_type == "*" {
                    Predicate::field_pattern("rel_*.internal_id", v.clone())
                } else {
                    Predicate::term(key, v.clone())
                }
            })
            .collect();
        return Ok(Predicate::any(per_value));
    }

    let per_value = values
        .iter()
        .map(|value| compile_scalar(key, operator, value))
        .collect::<Result<Vec<_>>>()?;
    Ok(Predicate::any(per_value))
}

fn compile_scalar(key: &str, operator: FilterOperator, value: &Value) -> Result<Predicate> {
    match operator {
        FilterOperator::Eq => {
            if schema::is_date_attribute(key) {
                return Ok(date_equality(key, value));
            }
            Ok(Predicate::term(key, value.clone()))
        }
        FilterOperator::Match => Ok(Predicate::match_field(key, value_text(value))),
        FilterOperator::Gt => Ok(Predicate::range(key, RangeBounds::gt(value.clone()))),
        FilterOperator::Gte => Ok(Predicate::range(key, RangeBounds::gte(value.clone()))),
        FilterOperator::Lt => Ok(Predicate::range(key, RangeBounds::lt(value.clone()))),
        FilterOperator::Lte => Ok(Predicate::range(key, RangeBounds::lte(value.clone()))),
        FilterOperator::Nil => unreachable!("nil handled before value dispatch"),
    }
}

/// Equality on a date attribute: a plain day spans the whole day, a
/// full timestamp pins the exact instant.
fn date_equality(key: &str, value: &Value) -> Predicate {
    let raw = value_text(value);
    if let Ok(day) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        let start = format!("{day}T00:00:00Z");
        let end = day
            .checked_add_days(Days::new(1))
            .map(|next| format!("{next}T00:00:00Z"));
        let mut bounds = RangeBounds::gte(start);
        if let Some(end) = end {
            bounds = bounds.and_lt(end);
        }
        return Predicate::range(key, bounds);
    }
    Predicate::range(key, RangeBounds::gte(raw.clone()).and_lte(raw))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
