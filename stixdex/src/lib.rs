//! stixdex — search, pagination and aggregation engine for STIX
//! threat-intelligence documents.
//!
//! The engine fronts a [`stixdex_store::DocumentStore`]: callers issue
//! paginate/aggregate/load requests with a principal and a declarative
//! filter tree; the engine compiles them into one store predicate,
//! executes, and post-processes hits (relation rebuild, cursors,
//! physical-index annotation). Index lifecycle (aliases, rollover,
//! reindex migration) lives behind the same façade.

pub mod access;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod index;
pub mod loader;
pub mod schema;
pub mod settings;

pub use access::{AuthContext, Principal};
pub use config::EngineConfig;
pub use engine::{
    AggregationOptions, CountOptions, Edge, EdgeConnection, Engine, HistogramOptions, LoadOptions,
    PageInfo, PaginateOptions, PaginateResult, DEFAULT_PAGINATION, MAX_PAGINATION,
};
pub use error::{Error, Result};
