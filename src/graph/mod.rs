//! Graph store: scope-tagged triples with insertion-log deltas.
//!
//! The store is the single owner of all assertions. Rules hold no state
//! between rounds; they read the store (and the previous round's delta) and
//! emit candidate triples, which the driver commits in batches.

pub mod store;

use serde::{Deserialize, Serialize};

use crate::term::TermId;

pub use store::{Epoch, GraphStore};

/// A (subject, predicate, object) assertion with an optional scope tag.
///
/// `scope: None` marks loader-asserted triples, visible in every scope whose
/// containers they mention. Every derived triple carries the scope it was
/// derived in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Triple {
    pub subject: TermId,
    pub predicate: TermId,
    pub object: TermId,
    pub scope: Option<TermId>,
}

impl Triple {
    /// Create an untagged (loader-asserted) triple.
    pub fn new(subject: TermId, predicate: TermId, object: TermId) -> Self {
        Self {
            subject,
            predicate,
            object,
            scope: None,
        }
    }

    /// Tag the triple with the scope it was derived in.
    pub fn in_scope(mut self, scope: TermId) -> Self {
        self.scope = Some(scope);
        self
    }
}
