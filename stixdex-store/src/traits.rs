//! Core store trait definition.
//!
//! `DocumentStore` is the unified interface between the engine and
//! whatever holds the documents: the in-process reference store, a
//! remote search cluster, or a SQL projection. All operations are
//! asynchronous network-call-shaped and hold no engine state.
//!
//! # Thread safety
//!
//! Implementations must be `Send + Sync`; concurrent reads are
//! independent, and concurrent writes to distinct document ids are
//! safe. Ordering of concurrent writes to the same id is the caller's
//! responsibility.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::Result;
use crate::predicate::{Predicate, SearchRequest, SearchResponse};

/// A document hit, annotated with the physical index it came from.
#[derive(Debug, Clone)]
pub struct Hit {
    pub index: String,
    pub doc: Document,
}

/// Unified store interface for all stixdex backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a physical index. Idempotent.
    async fn create_index(&self, index: &str) -> Result<()>;

    /// Drop a physical index and everything in it. Idempotent.
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Check whether a physical index exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// List all physical indices.
    async fn list_indices(&self) -> Result<Vec<String>>;

    /// Upsert documents into an index, keyed by document id.
    ///
    /// The index is created on first write, matching the lazy-creation
    /// behavior of the search engines this trait fronts.
    async fn index(&self, index: &str, docs: Vec<Document>) -> Result<()>;

    /// Fetch one document by id across the given indices.
    async fn get(&self, indices: &[String], id: &str) -> Result<Option<Hit>>;

    /// Fetch many documents by id in one round-trip.
    ///
    /// Missing ids are skipped; hits come back in the order of the
    /// requested ids.
    async fn mget(&self, indices: &[String], ids: &[String]) -> Result<Vec<Hit>>;

    /// Execute a search across the given indices.
    ///
    /// Indices that do not exist are ignored, so read patterns stay
    /// usable while parts of the platform are still initializing.
    async fn search(&self, indices: &[String], request: SearchRequest) -> Result<SearchResponse>;

    /// Count documents matching a predicate.
    async fn count(&self, indices: &[String], predicate: &Predicate) -> Result<u64>;

    /// Delete documents by id. Unknown ids are a no-op.
    async fn delete(&self, index: &str, ids: &[String]) -> Result<()>;
}
