//! The query engine.
//!
//! Callers hand the engine logical index names plus a query options
//! object; the engine compiles filters, search text and visibility
//! into one store predicate, executes it, and post-processes the hits
//! (relation rebuild, physical-index annotation, cursor assignment).

pub mod aggregation;
pub mod cursor;
pub mod relation;
pub mod search;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use stixdex_store::{
    sort_key, Document, DocumentStore, Hit, Predicate, RangeBounds, SearchRequest, SortOrder,
    SortSpec,
};

use crate::access::{AuthContext, Principal};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::filter::{self, FilterGroup};
use crate::index::IndexManager;
use crate::loader::BatchLoader;
use crate::schema;
use crate::settings::EntitySettingsCache;
use aggregation::{
    dense_histogram, terms_buckets, AggregationBucket, HistogramBucket, HistogramInterval,
    RelationAggregationArgs,
};
use cursor::{decode_cursor, encode_cursor};
use relation::{connections_of, rebuild_relation, ROLE_FROM_SUFFIX, ROLE_TO_SUFFIX};

/// Hard ceiling on page size; a larger `first` is clamped.
pub const MAX_PAGINATION: usize = 5000;
/// Page size applied when the caller does not pass `first`.
pub const DEFAULT_PAGINATION: usize = 500;

/// Options of a [`Engine::paginate`] call.
#[derive(Debug, Clone)]
pub struct PaginateOptions {
    pub types: Vec<String>,
    pub filters: Option<FilterGroup>,
    pub search: Option<String>,
    pub order_by: Option<String>,
    pub order_mode: Option<SortOrder>,
    pub first: Option<usize>,
    pub after: Option<String>,
    /// Skip visibility filtering for privileged queries.
    pub include_authorities: bool,
    /// Edge/cursor envelope (`true`) or a flat node list.
    pub connection_format: bool,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            filters: None,
            search: None,
            order_by: None,
            order_mode: None,
            first: None,
            after: None,
            include_authorities: false,
            connection_format: true,
        }
    }
}

/// Options of a [`Engine::load_by_id`] call.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Restrict the lookup to one entity type (ancestors accepted).
    pub entity_type: Option<String>,
    /// Restrict the lookup to specific logical indices.
    pub indices: Option<Vec<String>>,
}

impl LoadOptions {
    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn within(mut self, indices: Vec<String>) -> Self {
        self.indices = Some(indices);
        self
    }
}

/// Options of a [`Engine::count`] call.
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub types: Vec<String>,
    pub filters: Option<FilterGroup>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Options of an [`Engine::aggregation_count`] call.
#[derive(Debug, Clone, Default)]
pub struct AggregationOptions {
    pub types: Vec<String>,
    pub field: String,
    pub filters: Option<FilterGroup>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Options of an [`Engine::histogram_count`] call.
#[derive(Debug, Clone, Default)]
pub struct HistogramOptions {
    pub types: Vec<String>,
    pub field: String,
    pub interval: String,
    pub filters: Option<FilterGroup>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// One edge of a paginated connection.
#[derive(Debug, Clone)]
pub struct Edge {
    pub node: Document,
    pub cursor: String,
}

#[derive(Debug, Clone)]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    /// Total match count, independent of page size.
    pub global_count: u64,
}

#[derive(Debug, Clone)]
pub struct EdgeConnection {
    pub edges: Vec<Edge>,
    pub page_info: PageInfo,
}

/// Result of a paginate call, shaped by `connection_format`.
#[derive(Debug, Clone)]
pub enum PaginateResult {
    Connection(EdgeConnection),
    List(Vec<Document>),
}

impl PaginateResult {
    pub fn connection(self) -> Option<EdgeConnection> {
        match self {
            PaginateResult::Connection(c) => Some(c),
            PaginateResult::List(_) => None,
        }
    }

    /// The nodes of either shape.
    pub fn nodes(self) -> Vec<Document> {
        match self {
            PaginateResult::Connection(c) => c.edges.into_iter().map(|e| e.node).collect(),
            PaginateResult::List(docs) => docs,
        }
    }
}

/// The indexing and pagination engine.
pub struct Engine {
    store: Arc<dyn DocumentStore>,
    indices: IndexManager,
}

impl Engine {
    /// Initialize the engine: load alias state and make sure every
    /// platform write index exists behind its alias.
    pub async fn init(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Result<Self> {
        let indices = IndexManager::new(store.clone(), &config).await?;
        indices.create_indices(&schema::write_indices()).await?;
        Ok(Self { store, indices })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn indices(&self) -> &IndexManager {
        &self.indices
    }

    /// A per-request batch loader over the given logical indices.
    pub fn loader(&self, user: &Principal, indices: &[&str]) -> BatchLoader {
        BatchLoader::new(self.store.clone(), self.indices.resolve_read(indices), user.clone())
    }

    /// The read-through entity-settings cache.
    pub fn entity_settings(&self) -> EntitySettingsCache {
        EntitySettingsCache::new(
            self.store.clone(),
            self.indices.resolve_read(&[schema::INDEX_INTERNAL_OBJECTS]),
        )
    }

    /// Cursor-paginated query over one or many logical indices.
    pub async fn paginate(
        &self,
        ctx: &AuthContext,
        user: &Principal,
        indices: &[&str],
        options: PaginateOptions,
    ) -> Result<PaginateResult> {
        let first = options.first.unwrap_or(DEFAULT_PAGINATION).min(MAX_PAGINATION);
        let specs = resolve_sort(options.order_by.as_deref(), options.order_mode)?;

        let mut parts = Vec::new();
        if let Some(types) = types_predicate(&options.types) {
            parts.push(types);
        }
        if let Some(filters) = &options.filters {
            parts.push(filter::compile(filters)?);
        }
        if let Some(raw) = options.search.as_deref() {
            if let Some(predicate) = search::search_predicate(raw) {
                parts.push(predicate);
            }
        }
        if !options.include_authorities {
            if let Some(visibility) = user.visibility_predicate() {
                parts.push(visibility);
            }
        }
        let predicate = Predicate::all(parts);

        let after = match options.after.as_deref() {
            Some(cursor) => Some(decode_cursor(cursor)?),
            None => None,
        };

        let request = SearchRequest::new(predicate)
            .sorted(specs.clone())
            .after(after)
            .limited(first + 1);
        let physical = self.indices.resolve_read(indices);
        let mut response = self.store.search(&physical, request).await?;
        debug!(
            source = %ctx.source,
            total = response.total,
            indices = ?indices,
            "paginate executed"
        );

        let has_next_page = response.hits.len() > first;
        response.hits.truncate(first);

        let mut edges = Vec::with_capacity(response.hits.len());
        for hit in response.hits {
            let key = sort_key(&hit.doc, &specs);
            let node = process_hit(hit)?;
            edges.push(Edge { node, cursor: encode_cursor(&key)? });
        }

        if !options.connection_format {
            return Ok(PaginateResult::List(edges.into_iter().map(|e| e.node).collect()));
        }
        let end_cursor = edges.last().map(|e| e.cursor.clone());
        Ok(PaginateResult::Connection(EdgeConnection {
            edges,
            page_info: PageInfo { end_cursor, has_next_page, global_count: response.total },
        }))
    }

    /// Load one document by internal id, standard id or legacy STIX id.
    ///
    /// Absence is a normal outcome; two distinct documents answering
    /// the same id is not.
    pub async fn load_by_id(
        &self,
        ctx: &AuthContext,
        user: &Principal,
        id: &str,
        options: LoadOptions,
    ) -> Result<Option<Document>> {
        let mut parts = vec![Predicate::any(vec![
            Predicate::term("internal_id", id),
            Predicate::term("standard_id", id),
            Predicate::term("x_stixdex_stix_ids", id),
        ])];
        if let Some(entity_type) = &options.entity_type {
            parts.push(
                Predicate::term("entity_type", entity_type.clone())
                    .or(Predicate::term("parent_types", entity_type.clone())),
            );
        }
        if let Some(visibility) = user.visibility_predicate() {
            parts.push(visibility);
        }

        let logical: Vec<&str> = match &options.indices {
            Some(indices) => indices.iter().map(String::as_str).collect(),
            None => schema::read_data_indices(),
        };
        let physical = self.indices.resolve_read(&logical);
        let request = SearchRequest::new(Predicate::all(parts)).limited(2);
        let response = self.store.search(&physical, request).await?;
        debug!(source = %ctx.source, id, hits = response.hits.len(), "load by id");

        let hits = response.hits;
        if hits.len() > 1 && hits[0].doc.id != hits[1].doc.id {
            return Err(Error::AmbiguousId(id.to_string()));
        }
        match hits.into_iter().next() {
            Some(hit) => Ok(Some(process_hit(hit)?)),
            None => Ok(None),
        }
    }

    /// Count documents matching types, filters and a creation window.
    pub async fn count(
        &self,
        _ctx: &AuthContext,
        user: &Principal,
        indices: &[&str],
        options: CountOptions,
    ) -> Result<u64> {
        let mut parts = Vec::new();
        if let Some(types) = types_predicate(&options.types) {
            parts.push(types);
        }
        if let Some(filters) = &options.filters {
            parts.push(filter::compile(filters)?);
        }
        if let Some(range) = date_window("created_at", &options.start_date, &options.end_date) {
            parts.push(range);
        }
        if let Some(visibility) = user.visibility_predicate() {
            parts.push(visibility);
        }
        let physical = self.indices.resolve_read(indices);
        Ok(self.store.count(&physical, &Predicate::all(parts)).await?)
    }

    /// Grouped counts of a field over matching documents.
    pub async fn aggregation_count(
        &self,
        _ctx: &AuthContext,
        user: &Principal,
        indices: &[&str],
        options: AggregationOptions,
    ) -> Result<Vec<AggregationBucket>> {
        let mut parts = Vec::new();
        if let Some(types) = types_predicate(&options.types) {
            parts.push(types);
        }
        if let Some(filters) = &options.filters {
            parts.push(filter::compile(filters)?);
        }
        if let Some(range) = date_window("created_at", &options.start_date, &options.end_date) {
            parts.push(range);
        }
        if let Some(visibility) = user.visibility_predicate() {
            parts.push(visibility);
        }
        let physical = self.indices.resolve_read(indices);
        let request = SearchRequest::new(Predicate::all(parts));
        let response = self.store.search(&physical, request).await?;

        let labels = response
            .hits
            .iter()
            .flat_map(|hit| {
                hit.doc.str_list(&options.field).into_iter().map(str::to_string).collect::<Vec<_>>()
            })
            .collect();
        Ok(terms_buckets(labels))
    }

    /// Grouped counts of the opposite endpoint's entity type over
    /// matching relations.
    pub async fn aggregation_relations_count(
        &self,
        _ctx: &AuthContext,
        user: &Principal,
        indices: &[&str],
        args: RelationAggregationArgs,
    ) -> Result<Vec<AggregationBucket>> {
        let mut parts = Vec::new();
        if !args.relationship_types.is_empty() {
            parts.push(Predicate::any(
                args.relationship_types
                    .iter()
                    .map(|t| {
                        Predicate::term("relationship_type", t.clone())
                            .or(Predicate::term("parent_types", t.clone()))
                    })
                    .collect(),
            ));
        }
        let anchor = args.from_or_to_id.clone().or_else(|| args.from_id.clone());
        if let Some(id) = &anchor {
            parts.push(Predicate::nested(
                "connections",
                Predicate::term("internal_id", id.clone()),
            ));
        }
        if let Some(range) = date_window("created_at", &args.start, &args.end) {
            parts.push(range);
        }
        if let Some(visibility) = user.visibility_predicate() {
            parts.push(visibility);
        }

        let physical = self.indices.resolve_read(indices);
        let request = SearchRequest::new(Predicate::all(parts));
        let response = self.store.search(&physical, request).await?;

        let mut labels = Vec::new();
        for hit in &response.hits {
            let connections = connections_of(&hit.doc)?;
            let other = match (&args.from_or_to_id, &args.from_id) {
                (Some(id), _) => {
                    // Anchored on either side; count the opposite one.
                    let Some(matched) = connections.iter().find(|c| &c.internal_id == id) else {
                        continue;
                    };
                    let wanted = if matched.role.ends_with(ROLE_FROM_SUFFIX) {
                        ROLE_TO_SUFFIX
                    } else {
                        ROLE_FROM_SUFFIX
                    };
                    connections.iter().find(|c| c.role.ends_with(wanted))
                }
                (None, Some(id)) => {
                    let (anchor_suffix, other_suffix) = if args.is_to {
                        (ROLE_FROM_SUFFIX, ROLE_TO_SUFFIX)
                    } else {
                        (ROLE_TO_SUFFIX, ROLE_FROM_SUFFIX)
                    };
                    if !connections
                        .iter()
                        .any(|c| &c.internal_id == id && c.role.ends_with(anchor_suffix))
                    {
                        continue;
                    }
                    connections.iter().find(|c| c.role.ends_with(other_suffix))
                }
                (None, None) => connections.iter().find(|c| {
                    c.role.ends_with(if args.is_to { ROLE_TO_SUFFIX } else { ROLE_FROM_SUFFIX })
                }),
            };
            let Some(other) = other else { continue };
            if !args.element_with_target_types.is_empty()
                && !other
                    .types
                    .iter()
                    .any(|t| args.element_with_target_types.iter().any(|w| w == t))
            {
                continue;
            }
            if let Some(concrete) = other.types.first() {
                labels.push(concrete.clone());
            }
        }
        Ok(terms_buckets(labels))
    }

    /// Time-bucketed counts of a date field.
    pub async fn histogram_count(
        &self,
        _ctx: &AuthContext,
        user: &Principal,
        indices: &[&str],
        options: HistogramOptions,
    ) -> Result<Vec<HistogramBucket>> {
        let interval = HistogramInterval::parse(&options.interval)?;

        let mut parts = Vec::new();
        if let Some(types) = types_predicate(&options.types) {
            parts.push(types);
        }
        if let Some(filters) = &options.filters {
            parts.push(filter::compile(filters)?);
        }
        if let Some(range) = date_window(&options.field, &options.start_date, &options.end_date) {
            parts.push(range);
        }
        if let Some(visibility) = user.visibility_predicate() {
            parts.push(visibility);
        }

        let physical = self.indices.resolve_read(indices);
        let request = SearchRequest::new(Predicate::all(parts));
        let response = self.store.search(&physical, request).await?;
        let timestamps = response
            .hits
            .iter()
            .filter_map(|hit| hit.doc.date_field(&options.field))
            .collect();
        Ok(dense_histogram(timestamps, interval))
    }

    /// Index one raw document into a logical index.
    pub async fn index_document(&self, index: &str, body: Value) -> Result<Document> {
        let doc = Document::from_value(body).map_err(Error::Store)?;
        let physical = self.indices.resolve_write(index).await?;
        self.store.index(&physical, vec![doc.clone()]).await?;
        Ok(doc)
    }

    /// Validate and index a batch of documents, routed per type.
    ///
    /// The whole batch is validated before anything is written, so a
    /// malformed document never leaves a partially indexed batch
    /// behind.
    pub async fn index_elements(
        &self,
        ctx: &AuthContext,
        _user: &Principal,
        event: &str,
        elements: Vec<Document>,
    ) -> Result<usize> {
        let mut routed: HashMap<&'static str, Vec<Document>> = HashMap::new();
        for doc in elements {
            schema::validate_for_indexing(&doc)?;
            if doc.base_type() == Some(schema::BASE_TYPE_RELATION) {
                rebuild_relation(doc.clone())?;
            }
            routed.entry(schema::index_for_document(&doc)?).or_default().push(doc);
        }
        let mut indexed = 0;
        for (logical, docs) in routed {
            indexed += docs.len();
            let physical = self.indices.resolve_write(logical).await?;
            self.store.index(&physical, docs).await?;
        }
        debug!(source = %ctx.source, event, indexed, "elements indexed");
        Ok(indexed)
    }

    /// Delete documents from their physical indices.
    pub async fn delete_elements(
        &self,
        ctx: &AuthContext,
        _user: &Principal,
        elements: &[Document],
    ) -> Result<()> {
        for doc in elements {
            let physical = match doc.str_field("_index") {
                Some(index) => index.to_string(),
                None => self.indices.resolve_write(schema::index_for_document(doc)?).await?,
            };
            self.store.delete(&physical, &[doc.id.clone()]).await?;
        }
        debug!(source = %ctx.source, count = elements.len(), "elements deleted");
        Ok(())
    }

    /// Copy documents from a source index into a destination index,
    /// then remove them from the source.
    ///
    /// Writes are keyed by document id, so re-running the same
    /// migration is a no-op rather than a duplication.
    pub async fn reindex_elements(
        &self,
        ctx: &AuthContext,
        _user: &Principal,
        ids: &[String],
        source: &str,
        dest: &str,
    ) -> Result<usize> {
        let source_physical = self.indices.resolve_read(&[source]);
        let hits = self.store.mget(&source_physical, ids).await?;
        let dest_physical = self.indices.resolve_write(dest).await?;

        let docs: Vec<Document> = hits.iter().map(|hit| hit.doc.clone()).collect();
        let moved = docs.len();
        self.store.index(&dest_physical, docs).await?;
        for hit in &hits {
            self.store.delete(&hit.index, &[hit.doc.id.clone()]).await?;
        }
        debug!(source = %ctx.source, moved, from = source, to = dest, "elements reindexed");
        Ok(moved)
    }
}

/// Rebuild relation hits and annotate every node with the physical
/// index it came from.
fn process_hit(hit: Hit) -> Result<Document> {
    let mut doc = if hit.doc.base_type() == Some(schema::BASE_TYPE_RELATION) {
        rebuild_relation(hit.doc)?
    } else {
        hit.doc
    };
    doc.fields.insert("_index".to_string(), Value::String(hit.index));
    Ok(doc)
}

/// Type restriction over concrete types and ancestor chains.
fn types_predicate(types: &[String]) -> Option<Predicate> {
    if types.is_empty() {
        return None;
    }
    Some(Predicate::any(
        types
            .iter()
            .map(|t| {
                Predicate::term("entity_type", t.clone())
                    .or(Predicate::term("parent_types", t.clone()))
            })
            .collect(),
    ))
}

/// Half-open `[start, end)` window on a date attribute.
fn date_window(field: &str, start: &Option<String>, end: &Option<String>) -> Option<Predicate> {
    let mut bounds = RangeBounds::default();
    if let Some(start) = start {
        bounds.gte = Some(Value::String(start.clone()));
    }
    if let Some(end) = end {
        bounds.lt = Some(Value::String(end.clone()));
    }
    if bounds.gte.is_none() && bounds.lt.is_none() {
        return None;
    }
    Some(Predicate::range(field, bounds))
}

/// Resolve the composite sort of a paginate call.
///
/// The default and the tie-break key are both `standard_id`: standard
/// ids are deterministic and unique, which keeps cursors stable across
/// identical queries.
fn resolve_sort(order_by: Option<&str>, order_mode: Option<SortOrder>) -> Result<Vec<SortSpec>> {
    let order = order_mode.unwrap_or(SortOrder::Asc);
    let Some(field) = order_by else {
        return Ok(vec![SortSpec { field: "standard_id".to_string(), order }]);
    };
    if field.trim().is_empty() {
        return Err(Error::Validation("order field cannot be empty".to_string()));
    }
    let resolved = match schema::object_sort_subfield(field) {
        Some(subfield) => format!("{field}.{subfield}"),
        None => field.to_string(),
    };
    let mut specs = vec![SortSpec { field: resolved, order }];
    if field != "standard_id" {
        specs.push(SortSpec::asc("standard_id"));
    }
    Ok(specs)
}
