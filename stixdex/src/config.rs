//! Engine configuration.

use std::path::PathBuf;

/// Configuration handed to [`crate::Engine::init`] by the embedding
/// service.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix applied to every alias and physical index name, so
    /// several platform instances can share one store.
    pub index_prefix: String,

    /// Directory for persisted alias state. `None` keeps the alias
    /// registry in memory only.
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { index_prefix: "stixdex".to_string(), data_dir: None }
    }
}

impl EngineConfig {
    pub fn new(index_prefix: impl Into<String>) -> Self {
        Self { index_prefix: index_prefix.into(), ..Default::default() }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }
}
