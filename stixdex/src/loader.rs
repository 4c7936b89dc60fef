//! Per-request batch loading.
//!
//! Domain resolvers routinely ask for the same handful of documents
//! many times while serving one request. The loader is an explicit
//! request-scoped queue: lookups enqueue, duplicates coalesce, and one
//! multi-get resolves everything at dispatch time. The loader is
//! created at request start and dropped at request end; it never
//! outlives its request, so nothing leaks across requests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use stixdex_store::{Document, DocumentStore};

use crate::access::Principal;
use crate::engine::relation::rebuild_relation;
use crate::error::{Error, Result};
use crate::schema;

/// Request-scoped coalescing loader.
pub struct BatchLoader {
    store: Arc<dyn DocumentStore>,
    indices: Vec<String>,
    user: Principal,
    pending: Mutex<HashMap<String, Vec<oneshot::Sender<Option<Document>>>>>,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn DocumentStore>, indices: Vec<String>, user: Principal) -> Self {
        Self { store, indices, user, pending: Mutex::new(HashMap::new()) }
    }

    /// Enqueue a lookup. The returned future resolves at the next
    /// [`dispatch`](Self::dispatch); it fails if the loader is dropped
    /// first.
    pub fn load(&self, id: impl Into<String>) -> impl std::future::Future<Output = Result<Option<Document>>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().entry(id.into()).or_default().push(tx);
        async move {
            rx.await
                .map_err(|_| Error::Loader("request scope ended before dispatch".to_string()))
        }
    }

    /// Resolve every queued lookup with one multi-get.
    ///
    /// Returns the number of distinct ids fetched from the store.
    pub async fn dispatch(&self) -> Result<usize> {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return Ok(0);
        }
        let mut ids: Vec<String> = pending.keys().cloned().collect();
        ids.sort();
        let hits = self.store.mget(&self.indices, &ids).await?;
        debug!(requested = ids.len(), found = hits.len(), "loader dispatched");

        let mut found: HashMap<String, Document> = HashMap::new();
        for hit in hits {
            let mut doc = if hit.doc.base_type() == Some(schema::BASE_TYPE_RELATION) {
                rebuild_relation(hit.doc)?
            } else {
                hit.doc
            };
            doc.fields.insert("_index".to_string(), serde_json::Value::String(hit.index));
            if self.user.can_view(&doc) {
                found.insert(doc.id.clone(), doc);
            }
        }

        let fetched = ids.len();
        for (id, senders) in pending {
            for sender in senders {
                // receiver may have been dropped; that lookup is moot
                let _ = sender.send(found.get(&id).cloned());
            }
        }
        Ok(fetched)
    }

    /// Convenience: enqueue many ids and dispatch once.
    pub async fn load_many(&self, ids: &[String]) -> Result<Vec<Option<Document>>> {
        let futures: Vec<_> = ids.iter().map(|id| self.load(id.clone())).collect();
        self.dispatch().await?;
        futures::future::join_all(futures).await.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stixdex_store::MemoryStore;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .index(
                "objects-000001",
                vec![
                    Document::new("m1")
                        .with("entity_type", "Malware")
                        .with("base_type", "ENTITY")
                        .with("name", "Paradise Ransomware"),
                    Document::new("m2")
                        .with("entity_type", "Malware")
                        .with("base_type", "ENTITY")
                        .with("rel_object-marking.internal_id", json!(["tlp-red"])),
                ],
            )
            .await
            .unwrap();
        store
    }

    fn loader_for(store: Arc<MemoryStore>, user: Principal) -> BatchLoader {
        BatchLoader::new(store, vec!["objects-000001".to_string()], user)
    }

    #[tokio::test]
    async fn test_load_and_dispatch() {
        let loader = loader_for(seeded_store().await, Principal::privileged("admin"));
        let pending = loader.load("m1");
        let fetched = loader.dispatch().await.unwrap();
        assert_eq!(fetched, 1);
        let doc = pending.await.unwrap().unwrap();
        assert_eq!(doc.str_field("name"), Some("Paradise Ransomware"));
        assert_eq!(doc.str_field("_index"), Some("objects-000001"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_coalesce() {
        let loader = loader_for(seeded_store().await, Principal::privileged("admin"));
        let a = loader.load("m1");
        let b = loader.load("m1");
        let c = loader.load("missing");
        let fetched = loader.dispatch().await.unwrap();
        // two distinct ids, not three lookups
        assert_eq!(fetched, 2);
        assert!(a.await.unwrap().is_some());
        assert!(b.await.unwrap().is_some());
        assert!(c.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restricted_user_cannot_load_marked_doc() {
        let user = Principal::restricted("u", vec!["tlp-white".to_string()]);
        let loader = loader_for(seeded_store().await, user);
        let results = loader.load_many(&["m1".to_string(), "m2".to_string()]).await.unwrap();
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }

    #[tokio::test]
    async fn test_dropping_loader_fails_pending_loads() {
        let loader = loader_for(seeded_store().await, Principal::privileged("admin"));
        let pending = loader.load("m1");
        drop(loader);
        assert!(matches!(pending.await, Err(Error::Loader(_))));
    }

    #[tokio::test]
    async fn test_dispatch_without_pending_is_noop() {
        let loader = loader_for(seeded_store().await, Principal::privileged("admin"));
        assert_eq!(loader.dispatch().await.unwrap(), 0);
    }
}
