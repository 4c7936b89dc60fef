use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Relation rebuild error: {0}")]
    RelationRebuild(String),

    #[error("Ambiguous id: {0}")]
    AmbiguousId(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Store error: {0}")]
    Store(#[from] stixdex_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
