//! Pattern queries over the final store, with tabular answers.
//!
//! A query is a conjunction of triple patterns; the answer columns are the
//! query's variables in order of first appearance. Zero rows is a valid
//! answer, not an error.

use serde::Serialize;

use crate::error::QueryError;
use crate::graph::GraphStore;
use crate::rules::compile::{Binding, match_extend, resolve_predicate};
use crate::rules::TriplePattern;
use crate::term::{TermId, TermPool};
use crate::topology::Topology;
use crate::vocab::Vocab;

/// A parsed pattern query.
#[derive(Debug, Clone)]
pub struct Query {
    pub patterns: Vec<TriplePattern>,
    /// Output variables, in order of first appearance.
    pub select: Vec<String>,
}

impl Query {
    /// Parse a comma-separated pattern conjunction:
    /// `(?c hasLabel ?l), (?c hasFacet Healthcare)`.
    pub fn parse(text: &str, pool: &TermPool, vocab: &Vocab) -> Result<Self, QueryError> {
        let mut patterns = Vec::new();
        for part in split_patterns(text) {
            let pattern =
                TriplePattern::parse(part, pool, vocab).map_err(|e| QueryError::Syntax {
                    query: text.to_string(),
                    message: e.to_string(),
                })?;
            patterns.push(pattern);
        }
        if patterns.is_empty() {
            return Err(QueryError::Empty);
        }
        let mut select = Vec::new();
        for pattern in &patterns {
            for var in pattern.variables() {
                if !select.iter().any(|s| s == var) {
                    select.push(var.to_string());
                }
            }
        }
        Ok(Self { patterns, select })
    }

    /// Evaluate against a store, optionally restricted to one scope's view.
    ///
    /// Without a scope filter the query sees every triple; with one, it sees
    /// exactly what rules evaluating in that scope saw.
    pub fn evaluate(
        &self,
        store: &GraphStore,
        topology: &Topology,
        pool: &TermPool,
        scope: Option<TermId>,
    ) -> QueryAnswer {
        let view = scope.map(|s| topology.view(s));
        let mut bindings: Vec<Binding> = vec![Binding::new()];
        for pattern in &self.patterns {
            let mut next = Vec::new();
            for binding in &bindings {
                let predicate = resolve_predicate(pattern, binding);
                for triple in store.candidates(predicate) {
                    if let Some(v) = &view {
                        if !v.visible(&triple) {
                            continue;
                        }
                    }
                    if let Some(extended) = match_extend(pattern, &triple, binding) {
                        next.push(extended);
                    }
                }
            }
            bindings = next;
            if bindings.is_empty() {
                break;
            }
        }

        let mut rows: Vec<Vec<String>> = bindings
            .iter()
            .map(|b| {
                self.select
                    .iter()
                    .map(|var| {
                        b.get(var)
                            .map(|&id| pool.text(id))
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();
        rows.sort();
        rows.dedup();

        QueryAnswer {
            columns: self.select.iter().map(|v| format!("?{v}")).collect(),
            rows,
        }
    }
}

/// Tabular query result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl std::fmt::Display for QueryAnswer {
    /// Render as an aligned text table.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, "  ")?;
            }
            write!(f, "{col:<width$}", width = widths[i])?;
        }
        writeln!(f)?;
        for (i, _) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, "  ")?;
            }
            write!(f, "{:-<width$}", "", width = widths[i])?;
        }
        writeln!(f)?;
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    write!(f, "  ")?;
                }
                write!(f, "{cell:<width$}", width = widths[i])?;
            }
            writeln!(f)?;
        }
        write!(f, "({} row{})", self.rows.len(), if self.rows.len() == 1 { "" } else { "s" })
    }
}

/// Split a comma-separated list of `(...)` patterns.
fn split_patterns(s: &str) -> Vec<&str> {
    let s = s.trim();
    let mut results = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    results.push(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    if results.is_empty() && !s.is_empty() {
        results.push(s);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Triple;
    use crate::topology::TopologyBuilder;
    use crate::vocab::ContainerKind;

    fn setup() -> (TermPool, Vocab, Topology, GraphStore) {
        let pool = TermPool::new();
        let vocab = Vocab::resolve(&pool);
        let patients = pool.intern("patients");
        let visits = pool.intern("visits");
        let s1 = pool.intern("hr");
        let s2 = pool.intern("research");

        let mut b = TopologyBuilder::new();
        b.declare(patients, ContainerKind::Table, None);
        b.declare(visits, ContainerKind::Table, None);
        b.scope_member(s1, patients);
        b.scope_member(s2, patients);
        b.scope_member(s2, visits);
        let topology = b.build(&pool).unwrap();

        let mut store = GraphStore::new();
        let phi = pool.intern("hipaa:PHI");
        let personal = pool.intern("gdpr:PersonalData");
        store.insert(Triple::new(patients, vocab.has_label, phi).in_scope(s2));
        store.insert(Triple::new(patients, vocab.has_label, personal).in_scope(s2));
        store.insert(Triple::new(visits, vocab.has_label, personal).in_scope(s2));
        store.insert(Triple::new(patients, vocab.has_label, personal).in_scope(s1));

        (pool, vocab, topology, store)
    }

    #[test]
    fn parse_extracts_variables_in_order() {
        let pool = TermPool::new();
        let vocab = Vocab::resolve(&pool);
        let q = Query::parse("(?c hasLabel ?l), (?c hasFacet Healthcare)", &pool, &vocab)
            .unwrap();
        assert_eq!(q.patterns.len(), 2);
        assert_eq!(q.select, vec!["c", "l"]);
    }

    #[test]
    fn empty_query_rejected() {
        let pool = TermPool::new();
        let vocab = Vocab::resolve(&pool);
        assert!(matches!(
            Query::parse("", &pool, &vocab),
            Err(QueryError::Empty)
        ));
    }

    #[test]
    fn evaluate_joins_and_sorts() {
        let (pool, vocab, topology, store) = setup();
        let q = Query::parse("(?c hasLabel ?l)", &pool, &vocab).unwrap();
        let answer = q.evaluate(&store, &topology, &pool, None);
        assert_eq!(answer.columns, vec!["?c", "?l"]);
        assert_eq!(answer.rows.len(), 3); // deduped across scopes
        assert!(answer.rows.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn scope_filter_restricts_rows() {
        let (pool, vocab, topology, store) = setup();
        let hr = pool.lookup("hr").unwrap();
        let q = Query::parse("(?c hasLabel ?l)", &pool, &vocab).unwrap();
        let answer = q.evaluate(&store, &topology, &pool, Some(hr));
        assert_eq!(answer.rows.len(), 1);
        assert_eq!(answer.rows[0], vec!["patients", "gdpr:PersonalData"]);
    }

    #[test]
    fn zero_rows_is_not_an_error() {
        let (pool, vocab, topology, store) = setup();
        let q = Query::parse("(?c hasFacet Healthcare)", &pool, &vocab).unwrap();
        let answer = q.evaluate(&store, &topology, &pool, None);
        assert!(answer.rows.is_empty());
    }

    #[test]
    fn display_renders_aligned_table() {
        let answer = QueryAnswer {
            columns: vec!["?c".into(), "?l".into()],
            rows: vec![vec!["patients".into(), "hipaa:PHI".into()]],
        };
        let rendered = answer.to_string();
        assert!(rendered.contains("?c"));
        assert!(rendered.contains("patients"));
        assert!(rendered.contains("(1 row)"));
    }

    #[test]
    fn concrete_query_binds_nothing_but_matches() {
        let (pool, vocab, topology, store) = setup();
        let q = Query::parse("(patients hasLabel hipaa:PHI)", &pool, &vocab).unwrap();
        let answer = q.evaluate(&store, &topology, &pool, None);
        // One (empty) row: the pattern matched but selected no variables.
        assert_eq!(answer.rows.len(), 1);
        assert!(answer.columns.is_empty());
    }
}
