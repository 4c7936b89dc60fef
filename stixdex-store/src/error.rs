//! Store error types.

use thiserror::Error;

/// Errors raised by document store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error during a storage operation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Index not found
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Document is not a JSON object or misses its identifier
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
