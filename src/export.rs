//! Label-resolved export of a store.
//!
//! Exports render every triple back to its term texts and sort the result,
//! so two runs that derive the same triple set serialize to identical bytes
//! regardless of insertion order. The determinism test and the result cache
//! both rely on this.

use serde::{Deserialize, Serialize};

use crate::graph::{GraphStore, Triple};
use crate::term::TermPool;

/// One triple with all terms resolved to their texts.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ExportedTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub scope: Option<String>,
}

/// Export a store as sorted, label-resolved triples.
pub fn export_store(store: &GraphStore, pool: &TermPool) -> Vec<ExportedTriple> {
    let mut out: Vec<ExportedTriple> = store
        .iter()
        .map(|t| ExportedTriple {
            subject: pool.text(t.subject),
            predicate: pool.text(t.predicate),
            object: pool.text(t.object),
            scope: t.scope.map(|s| pool.text(s)),
        })
        .collect();
    out.sort();
    out
}

/// Re-intern an export into a store, e.g. when replaying a cache entry.
pub fn import_store(export: &[ExportedTriple], store: &mut GraphStore, pool: &TermPool) {
    for entry in export {
        let triple = Triple {
            subject: pool.intern(&entry.subject),
            predicate: pool.intern(&entry.predicate),
            object: pool.intern(&entry.object),
            scope: entry.scope.as_deref().map(|s| pool.intern(s)),
        };
        store.insert(triple);
    }
}
