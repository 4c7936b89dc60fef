//! Grouped counts and date histograms.
//!
//! All bucketing happens in UTC. Histogram intervals are restricted to
//! day, month and year; the validation runs before the store is
//! touched so an unsupported granularity never executes a query.

use chrono::{DateTime, Datelike, Days, Months, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

/// A grouped-count bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationBucket {
    pub label: String,
    pub value: u64,
}

/// A histogram bucket, labeled by its UTC period.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBucket {
    pub date: String,
    pub value: u64,
}

/// Supported histogram granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramInterval {
    Day,
    Month,
    Year,
}

impl HistogramInterval {
    /// Parse a caller-supplied interval name.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_lowercase().as_str() {
            "day" => Ok(HistogramInterval::Day),
            "month" => Ok(HistogramInterval::Month),
            "year" => Ok(HistogramInterval::Year),
            other => Err(Error::Validation(format!("Unsupported interval: {other}"))),
        }
    }

    /// Round a timestamp down to its bucket boundary.
    pub fn floor(&self, dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (year, month, day) = match self {
            HistogramInterval::Day => (dt.year(), dt.month(), dt.day()),
            HistogramInterval::Month => (dt.year(), dt.month(), 1),
            HistogramInterval::Year => (dt.year(), 1, 1),
        };
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
    }

    /// The boundary of the following bucket.
    pub fn next(&self, boundary: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            HistogramInterval::Day => boundary.checked_add_days(Days::new(1)),
            HistogramInterval::Month => boundary.checked_add_months(Months::new(1)),
            HistogramInterval::Year => boundary.checked_add_months(Months::new(12)),
        }
    }

    /// Bucket label: `YYYY-MM-DD`, `YYYY-MM` or `YYYY`.
    pub fn label(&self, boundary: DateTime<Utc>) -> String {
        match self {
            HistogramInterval::Day => boundary.format("%Y-%m-%d").to_string(),
            HistogramInterval::Month => boundary.format("%Y-%m").to_string(),
            HistogramInterval::Year => boundary.format("%Y").to_string(),
        }
    }
}

/// Bucket timestamps and dense-fill empty buckets strictly between the
/// first and last non-empty ones.
pub fn dense_histogram(
    timestamps: Vec<DateTime<Utc>>,
    interval: HistogramInterval,
) -> Vec<HistogramBucket> {
    let mut counts: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
    for ts in timestamps {
        if let Some(boundary) = interval.floor(ts) {
            *counts.entry(boundary).or_insert(0) += 1;
        }
    }
    let (Some(first), Some(last)) =
        (counts.keys().next().copied(), counts.keys().next_back().copied())
    else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut boundary = first;
    while boundary <= last {
        let value = counts.get(&boundary).copied().unwrap_or(0);
        out.push(HistogramBucket { date: interval.label(boundary), value });
        match interval.next(boundary) {
            Some(next) => boundary = next,
            None => break,
        }
    }
    out
}

/// Count occurrences per label, ordered by descending count then label.
pub fn terms_buckets(labels: Vec<String>) -> Vec<AggregationBucket> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    let mut buckets: Vec<AggregationBucket> = counts
        .into_iter()
        .map(|(label, value)| AggregationBucket { label, value })
        .collect();
    buckets.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.label.cmp(&b.label)));
    buckets
}

/// Arguments of a relation aggregation: which relation types to count,
/// how the counted relations anchor to an entity, and how the *other*
/// endpoint is restricted.
#[derive(Debug, Clone, Default)]
pub struct RelationAggregationArgs {
    /// Relation types (or parent categories) to aggregate over.
    pub relationship_types: Vec<String>,
    /// Anchor: relations whose source endpoint is this entity.
    pub from_id: Option<String>,
    /// Anchor: relations touching this entity on either end.
    pub from_or_to_id: Option<String>,
    /// Restrict the opposite endpoint to these types (ancestors count).
    pub element_with_target_types: Vec<String>,
    /// Count the target endpoint (`true`) or the source endpoint.
    pub is_to: bool,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RelationAggregationArgs {
    pub fn new(relationship_types: Vec<String>) -> Self {
        Self { relationship_types, is_to: true, ..Default::default() }
    }

    pub fn from_entity(mut self, id: impl Into<String>) -> Self {
        self.from_id = Some(id.into());
        self
    }

    pub fn around_entity(mut self, id: impl Into<String>) -> Self {
        self.from_or_to_id = Some(id.into());
        self
    }

    pub fn with_target_types(mut self, types: Vec<String>) -> Self {
        self.element_with_target_types = types;
        self
    }

    pub fn between(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self.end = Some(end.into());
        self
    }
}
