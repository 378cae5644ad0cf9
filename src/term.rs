//! Interned terms: the atomic vocabulary of the engine.
//!
//! Every name in the system — containers, scopes, facets, labels, predicates,
//! literal values — is interned once in a [`TermPool`] and referenced by a
//! [`TermId`] everywhere else. Identity comparisons are integer comparisons,
//! and entities reference each other by id only, which keeps the object graph
//! acyclic even though the data it describes is not.

use std::num::NonZeroU32;
use std::sync::RwLock;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Unique, niche-optimized identifier for an interned term.
///
/// Uses `NonZeroU32` so that `Option<TermId>` is the same size as `TermId`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct TermId(NonZeroU32);

impl TermId {
    /// Create a `TermId` from a raw `u32`. Returns `None` if `raw` is zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(TermId)
    }

    /// Get the underlying `u32` value.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for TermId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t:{}", self.0)
    }
}

/// Return the namespace prefix of a term text, if any.
///
/// `"hipaa:PHI"` → `Some("hipaa")`; `"Healthcare"` → `None`.
pub fn namespace(text: &str) -> Option<&str> {
    text.split_once(':').map(|(ns, _)| ns)
}

/// Thread-safe string interner.
///
/// Interning is idempotent: the same text always yields the same id within a
/// pool, and ids are allocated densely in first-intern order, so a run that
/// interns the same texts in the same order produces the same ids.
#[derive(Debug, Default)]
pub struct TermPool {
    by_text: DashMap<String, TermId>,
    texts: RwLock<Vec<String>>,
}

impl TermPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a term, returning its id.
    pub fn intern(&self, text: &str) -> TermId {
        if let Some(id) = self.by_text.get(text) {
            return *id.value();
        }
        let mut texts = self.texts.write().expect("term pool lock poisoned");
        // Double-check after acquiring the write lock.
        if let Some(id) = self.by_text.get(text) {
            return *id.value();
        }
        texts.push(text.to_string());
        let raw = u32::try_from(texts.len()).expect("term pool exhausted");
        let id = TermId::new(raw).expect("term pool exhausted");
        self.by_text.insert(text.to_string(), id);
        id
    }

    /// Look up a term id without interning.
    pub fn lookup(&self, text: &str) -> Option<TermId> {
        self.by_text.get(text).map(|id| *id.value())
    }

    /// Resolve an id back to its text.
    pub fn resolve(&self, id: TermId) -> Option<String> {
        let texts = self.texts.read().expect("term pool lock poisoned");
        texts.get(id.get() as usize - 1).cloned()
    }

    /// Resolve an id to its text, falling back to the numeric form.
    pub fn text(&self, id: TermId) -> String {
        self.resolve(id).unwrap_or_else(|| id.to_string())
    }

    /// Number of interned terms.
    pub fn len(&self) -> usize {
        self.by_text.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.by_text.is_empty()
    }
}
