//! Document store abstraction for the stixdex engine.
//!
//! This crate defines the storage-facing half of the platform: the
//! schema-less [`Document`] model, the backend-agnostic [`Predicate`]
//! query tree, the [`DocumentStore`] trait every backend implements,
//! and an in-process [`MemoryStore`] reference backend used by the
//! engine's test suites and by embedded deployments.

pub mod analysis;
pub mod document;
pub mod error;
pub mod memory;
pub mod predicate;
pub mod traits;

pub use document::{parse_datetime, Document};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use predicate::{
    cmp_sort_keys, sort_key, Predicate, RangeBounds, SearchRequest, SearchResponse, SortOrder,
    SortSpec,
};
pub use traits::{DocumentStore, Hit};
