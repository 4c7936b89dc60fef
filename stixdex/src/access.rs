//! Principals and marking-based visibility.
//!
//! Visibility is enforced inside the store query, never by trimming a
//! returned page: a restricted principal's predicate is part of every
//! search, so page sizes and totals already reflect what the principal
//! may see.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stixdex_store::{Document, Predicate};

/// Attribute carrying the marking ids of a document.
pub const MARKING_REF_ATTRIBUTE: &str = "rel_object-marking.internal_id";

/// Per-call context supplied by the transport layer.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Identifies the originating call for tracing.
    pub source: String,
}

impl AuthContext {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }
}

/// The acting principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    /// Marking definition ids this principal is cleared for.
    pub allowed_marking_ids: Vec<String>,
    /// Platform accounts (workers, administrators) bypass marking
    /// checks entirely.
    pub bypass: bool,
}

impl Principal {
    /// A privileged principal seeing every document.
    pub fn privileged(id: impl Into<String>) -> Self {
        Self { id: id.into(), allowed_marking_ids: Vec::new(), bypass: true }
    }

    /// A restricted principal cleared for the given marking ids.
    pub fn restricted(id: impl Into<String>, allowed_marking_ids: Vec<String>) -> Self {
        Self { id: id.into(), allowed_marking_ids, bypass: false }
    }

    /// Visibility predicate of this principal, `None` when unrestricted.
    ///
    /// A document is visible when every one of its markings is in the
    /// allowed set; unmarked documents are visible to everyone.
    pub fn visibility_predicate(&self) -> Option<Predicate> {
        if self.bypass {
            return None;
        }
        let allowed: Vec<Value> =
            self.allowed_marking_ids.iter().map(|id| Value::String(id.clone())).collect();
        Some(Predicate::all_in(MARKING_REF_ATTRIBUTE, allowed))
    }

    /// Direct visibility check, used on multi-get paths that bypass
    /// the search predicate.
    pub fn can_view(&self, doc: &Document) -> bool {
        match self.visibility_predicate() {
            None => true,
            Some(predicate) => predicate.matches_doc(doc),
        }
    }
}
