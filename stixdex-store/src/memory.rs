//! In-process reference store.
//!
//! Keeps every index as an ordered id-to-document map under a
//! read-write lock. Predicates are evaluated directly against the
//! documents, and sorting runs the same composite comparator that
//! `search_after` resumption uses, which is what keeps paginated
//! windows disjoint.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::document::Document;
use crate::error::Result;
use crate::predicate::{cmp_sort_keys, sort_key, Predicate, SearchRequest, SearchResponse, SortSpec};
use crate::traits::{DocumentStore, Hit};

/// In-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    indices: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching(&self, indices: &[String], predicate: &Predicate) -> Vec<Hit> {
        let guard = self.indices.read();
        let mut hits = Vec::new();
        for index in indices {
            let Some(docs) = guard.get(index) else { continue };
            for doc in docs.values() {
                if predicate.matches_doc(doc) {
                    hits.push(Hit { index: index.clone(), doc: doc.clone() });
                }
            }
        }
        hits
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_index(&self, index: &str) -> Result<()> {
        let mut guard = self.indices.write();
        guard.entry(index.to_string()).or_default();
        debug!(index, "index created");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let removed = self.indices.write().remove(index);
        debug!(index, existed = removed.is_some(), "index deleted");
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.read().contains_key(index))
    }

    async fn list_indices(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn index(&self, index: &str, docs: Vec<Document>) -> Result<()> {
        let mut guard = self.indices.write();
        let entry = guard.entry(index.to_string()).or_default();
        for doc in docs {
            entry.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    async fn get(&self, indices: &[String], id: &str) -> Result<Option<Hit>> {
        let guard = self.indices.read();
        for index in indices {
            if let Some(doc) = guard.get(index).and_then(|docs| docs.get(id)) {
                return Ok(Some(Hit { index: index.clone(), doc: doc.clone() }));
            }
        }
        Ok(None)
    }

    async fn mget(&self, indices: &[String], ids: &[String]) -> Result<Vec<Hit>> {
        let guard = self.indices.read();
        let mut hits = Vec::new();
        for id in ids {
            for index in indices {
                if let Some(doc) = guard.get(index).and_then(|docs| docs.get(id)) {
                    hits.push(Hit { index: index.clone(), doc: doc.clone() });
                    break;
                }
            }
        }
        Ok(hits)
    }

    async fn search(&self, indices: &[String], request: SearchRequest) -> Result<SearchResponse> {
        let mut hits = self.matching(indices, &request.predicate);
        let total = hits.len() as u64;

        let mut specs = request.sort.clone();
        if specs.is_empty() {
            specs.push(SortSpec::asc("internal_id"));
        }

        let mut keyed: Vec<(Vec<Value>, Hit)> = hits
            .drain(..)
            .map(|hit| (sort_key(&hit.doc, &specs), hit))
            .collect();
        keyed.sort_by(|(ka, ha), (kb, hb)| {
            cmp_sort_keys(ka, kb, &specs).then_with(|| ha.doc.id.cmp(&hb.doc.id))
        });

        let after = request.search_after.as_deref();
        let mut out = Vec::new();
        for (key, hit) in keyed {
            if let Some(after_key) = after {
                if cmp_sort_keys(&key, after_key, &specs) != Ordering::Greater {
                    continue;
                }
            }
            out.push(hit);
            if let Some(limit) = request.limit {
                if out.len() >= limit {
                    break;
                }
            }
        }

        debug!(total, returned = out.len(), "search executed");
        Ok(SearchResponse { hits: out, total })
    }

    async fn count(&self, indices: &[String], predicate: &Predicate) -> Result<u64> {
        Ok(self.matching(indices, predicate).len() as u64)
    }

    async fn delete(&self, index: &str, ids: &[String]) -> Result<()> {
        let mut guard = self.indices.write();
        if let Some(docs) = guard.get_mut(index) {
            for id in ids {
                docs.remove(id);
            }
        }
        Ok(())
    }
}
