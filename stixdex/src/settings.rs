//! Entity-settings cache.
//!
//! Per-type platform configuration (mandatory OTP, file-ref policy,
//! enforced markings) lives in `EntitySetting` documents in the
//! internal-objects index. Domain code reads these on nearly every
//! call, so lookups go through a read-through cache with explicit
//! invalidation on settings writes.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use stixdex_store::{Document, DocumentStore, Predicate, SearchRequest};

use crate::error::Result;

/// Entity type of settings documents.
pub const ENTITY_TYPE_ENTITY_SETTING: &str = "EntitySetting";

/// Read-through cache of `EntitySetting` documents keyed by the type
/// they configure.
pub struct EntitySettingsCache {
    store: Arc<dyn DocumentStore>,
    indices: Vec<String>,
    cache: RwLock<HashMap<String, Option<Document>>>,
}

impl EntitySettingsCache {
    pub fn new(store: Arc<dyn DocumentStore>, indices: Vec<String>) -> Self {
        Self { store, indices, cache: RwLock::new(HashMap::new()) }
    }

    /// Settings of a target type, cached after the first lookup.
    pub async fn get(&self, target_type: &str) -> Result<Option<Document>> {
        if let Some(cached) = self.cache.read().get(target_type) {
            return Ok(cached.clone());
        }
        let predicate = Predicate::term("entity_type", ENTITY_TYPE_ENTITY_SETTING)
            .and(Predicate::term("target_type", target_type));
        let response = self
            .store
            .search(&self.indices, SearchRequest::new(predicate).limited(1))
            .await?;
        let setting = response.hits.into_iter().next().map(|hit| hit.doc);
        debug!(target_type, found = setting.is_some(), "entity setting resolved");
        self.cache.write().insert(target_type.to_string(), setting.clone());
        Ok(setting)
    }

    /// A boolean flag of a target type's settings, e.g. whether OTP is
    /// mandatory for users.
    pub async fn flag(&self, target_type: &str, key: &str) -> Result<Option<bool>> {
        Ok(self
            .get(target_type)
            .await?
            .and_then(|doc| doc.get(key).and_then(serde_json::Value::as_bool)))
    }

    /// Drop cached entries after a settings write.
    pub fn reset(&self) {
        self.cache.write().clear();
    }
}
