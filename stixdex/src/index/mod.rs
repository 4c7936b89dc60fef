//! Index lifecycle management.
//!
//! Every logical index name resolves through an alias to exactly one
//! active physical index named `<prefix>_<name>-NNNNNN`. Migrations
//! roll the sequence number forward and repoint the alias, so readers
//! and writers never see a half-built index. Alias state is persisted
//! as JSON under the engine's data dir and reloaded on startup.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::schema;
use stixdex_store::DocumentStore;

/// Suffix of the first physical index behind a fresh alias.
pub const INDEX_PATTERN_SUFFIX: &str = "-000001";

/// One alias and the physical index it points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub alias: String,
    pub physical: String,
    pub sequence: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Alias description in the shape read paths expect:
/// `{physical: {aliases: {alias: {}}}}`.
#[derive(Debug, Clone, Serialize)]
pub struct AliasInfo {
    pub aliases: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AliasState {
    aliases: HashMap<String, AliasEntry>,
    last_saved_at: Option<DateTime<Utc>>,
}

/// Manages aliases and physical indices.
pub struct IndexManager {
    store: Arc<dyn DocumentStore>,
    prefix: String,
    state: RwLock<AliasState>,
    state_path: Option<PathBuf>,
}

impl IndexManager {
    /// Create a manager, loading persisted alias state when a data dir
    /// is configured.
    pub async fn new(store: Arc<dyn DocumentStore>, config: &EngineConfig) -> Result<Self> {
        let state_path = match &config.data_dir {
            Some(dir) => {
                fs::create_dir_all(dir).await?;
                Some(dir.join("alias-state.json"))
            }
            None => None,
        };
        let state = match &state_path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path).await?;
                serde_json::from_str(&content)?
            }
            _ => AliasState::default(),
        };
        Ok(Self {
            store,
            prefix: config.index_prefix.clone(),
            state: RwLock::new(state),
            state_path,
        })
    }

    /// The alias of a logical index name; already-prefixed names pass
    /// through.
    pub fn alias_name(&self, logical: &str) -> String {
        let prefixed = format!("{}_", self.prefix);
        if logical.starts_with(&prefixed) {
            logical.to_string()
        } else {
            format!("{}_{logical}", self.prefix)
        }
    }

    fn physical_of(alias: &str, sequence: u32) -> String {
        format!("{alias}-{sequence:06}")
    }

    fn entry(&self, name: &str) -> Option<AliasEntry> {
        let state = self.state.read();
        state
            .aliases
            .get(&self.alias_name(name))
            .or_else(|| state.aliases.get(name))
            .cloned()
    }

    /// Create logical indices (alias plus first physical index).
    /// Idempotent; recreating a retired logical name is refused.
    pub async fn create_indices(&self, logicals: &[&str]) -> Result<()> {
        for logical in logicals {
            if schema::deprecated_indices().contains(logical) {
                return Err(Error::Validation(format!(
                    "index {logical} is deprecated and cannot be recreated"
                )));
            }
            let alias = self.alias_name(logical);
            let physical = {
                let mut state = self.state.write();
                let now = Utc::now();
                let entry = state.aliases.entry(alias.clone()).or_insert_with(|| AliasEntry {
                    alias: alias.clone(),
                    physical: Self::physical_of(&alias, 1),
                    sequence: 1,
                    created_at: now,
                    updated_at: now,
                });
                entry.physical.clone()
            };
            self.store.create_index(&physical).await?;
            debug!(alias = %alias, physical = %physical, "index ensured");
        }
        self.save().await
    }

    /// Drop indices by logical, alias or physical name.
    pub async fn delete_indices(&self, names: &[&str]) -> Result<()> {
        for name in names {
            let physical = if is_physical_name(name) {
                let mut state = self.state.write();
                state.aliases.retain(|_, entry| entry.physical != *name);
                name.to_string()
            } else {
                match self.entry(name) {
                    Some(entry) => {
                        self.state.write().aliases.remove(&entry.alias);
                        entry.physical
                    }
                    None => continue,
                }
            };
            self.store.delete_index(&physical).await?;
            debug!(physical = %physical, "index deleted");
        }
        self.save().await
    }

    /// Whether a logical, alias or physical name resolves to an
    /// existing physical index.
    pub async fn index_exists(&self, name: &str) -> Result<bool> {
        match self.entry(name) {
            Some(entry) => Ok(self.store.index_exists(&entry.physical).await?),
            None => Ok(self.store.index_exists(name).await?),
        }
    }

    /// Alias description of a logical index.
    ///
    /// The single-alias invariant means the returned map always has
    /// exactly one physical entry.
    pub fn get_alias(&self, logical: &str) -> Result<HashMap<String, AliasInfo>> {
        let entry = self
            .entry(logical)
            .ok_or_else(|| Error::AliasNotFound(logical.to_string()))?;
        let mut aliases = HashMap::new();
        aliases.insert(entry.alias, Value::Object(serde_json::Map::new()));
        let mut out = HashMap::new();
        out.insert(entry.physical, AliasInfo { aliases });
        Ok(out)
    }

    /// Resolve read names to physical indices.
    ///
    /// Unknown names fall back to the naming convention so reads keep
    /// working against a store whose alias registry was rebuilt.
    pub fn resolve_read(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|name| match self.entry(name) {
                Some(entry) => entry.physical,
                None if is_physical_name(name) => name.to_string(),
                None => format!("{}{INDEX_PATTERN_SUFFIX}", self.alias_name(name)),
            })
            .collect()
    }

    /// Resolve (and lazily create) the write target of a logical index.
    pub async fn resolve_write(&self, logical: &str) -> Result<String> {
        if let Some(entry) = self.entry(logical) {
            return Ok(entry.physical);
        }
        self.create_indices(&[logical]).await?;
        self.entry(logical)
            .map(|entry| entry.physical)
            .ok_or_else(|| Error::AliasNotFound(logical.to_string()))
    }

    /// Roll the alias of a logical index to a fresh physical index.
    ///
    /// The previous physical index stays in the store for the caller
    /// to reindex from and drop; the alias only ever points at the new
    /// one.
    pub async fn rollover(&self, logical: &str) -> Result<String> {
        let alias = self.alias_name(logical);
        let next_physical = {
            let mut state = self.state.write();
            let entry = state
                .aliases
                .get_mut(&alias)
                .ok_or_else(|| Error::AliasNotFound(logical.to_string()))?;
            entry.sequence += 1;
            entry.physical = Self::physical_of(&alias, entry.sequence);
            entry.updated_at = Utc::now();
            entry.physical.clone()
        };
        self.store.create_index(&next_physical).await?;
        self.save().await?;
        debug!(alias = %alias, physical = %next_physical, "alias rolled over");
        Ok(next_physical)
    }

    /// All registered aliases.
    pub fn list_aliases(&self) -> Vec<AliasEntry> {
        self.state.read().aliases.values().cloned().collect()
    }

    async fn save(&self) -> Result<()> {
        let Some(path) = &self.state_path else { return Ok(()) };
        let snapshot = {
            let mut state = self.state.write();
            state.last_saved_at = Some(Utc::now());
            state.clone()
        };
        let content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

/// Physical names end with a dash and a 6-digit sequence.
fn is_physical_name(name: &str) -> bool {
    let Some(pos) = name.rfind('-') else { return false };
    let suffix = &name[pos + 1..];
    suffix.len() == 6 && suffix.bytes().all(|b| b.is_ascii_digit())
}
