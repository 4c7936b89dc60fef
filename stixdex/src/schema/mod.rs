//! Platform schema knowledge.
//!
//! Documents are schema-less, so the "schema" is a small set of
//! registries: which attributes are dates, how object attributes sort,
//! how documents route to logical indices, and what a document must
//! carry before it may be indexed.

pub mod ids;
pub mod types;

pub use ids::{internal_id, standard_id};
pub use types::*;
