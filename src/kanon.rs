//! K-anonymity analysis: per-table, per-scope anonymity-set sizes and the
//! framework threshold labels derived from them.
//!
//! The analyzer is a specialized rule family: it runs in every fixed-point
//! round like any other rule (its inputs — quasi-identifier facets and
//! declared k values — are monotone), while the acceptance labels, whose
//! premise includes an absence check, are emitted in a single pass after
//! the fixpoint is reached.

use std::collections::HashMap;

use crate::graph::{GraphStore, Triple};
use crate::rules::KPolicy;
use crate::skolem::Skolemizer;
use crate::term::{TermId, TermPool};
use crate::topology::{ScopeView, Topology};
use crate::vocab::{ContainerKind, Vocab};

/// A data sample registered for one table: quasi-identifier grouping runs
/// over these rows when the table has no authored k value.
#[derive(Debug, Clone)]
pub struct TableSample {
    /// Field terms, one per column.
    pub columns: Vec<TermId>,
    /// Row values, one string per column.
    pub rows: Vec<Vec<String>>,
}

impl TableSample {
    /// The anonymity set size over the given quasi-identifier fields:
    /// group rows by the tuple of quasi-identifier values, take the
    /// smallest group. `None` when no quasi-identifier column is sampled
    /// or the sample is empty.
    pub fn k_for(&self, quasi: &[TermId]) -> Option<u32> {
        let positions: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| quasi.contains(c))
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return None;
        }
        let mut groups: HashMap<Vec<&str>, u32> = HashMap::new();
        for row in &self.rows {
            let key: Vec<&str> = positions
                .iter()
                .filter_map(|&i| row.get(i).map(String::as_str))
                .collect();
            *groups.entry(key).or_insert(0) += 1;
        }
        groups.values().min().copied()
    }
}

/// Registered samples, keyed by table term.
#[derive(Debug, Default)]
pub struct SampleStore {
    samples: HashMap<TermId, TableSample>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: TermId, sample: TableSample) {
        self.samples.insert(table, sample);
    }

    pub fn get(&self, table: TermId) -> Option<&TableSample> {
        self.samples.get(&table)
    }
}

/// Everything the analyzer reads during a pass.
pub struct KAnonContext<'a> {
    pub store: &'a GraphStore,
    pub topology: &'a Topology,
    pub vocab: &'a Vocab,
    pub pool: &'a TermPool,
    pub samples: &'a SampleStore,
    pub policies: &'a [KPolicy],
}

/// Per-round pass: result nodes plus risk labels. Monotone — depends only
/// on facets, declared k, and samples, all of which only grow.
pub fn round_pass(ctx: &KAnonContext<'_>, scope: TermId) -> Vec<Triple> {
    let view = ctx.topology.view(scope);
    let skolem = Skolemizer::new();
    let mut out = Vec::new();

    for table in ctx.topology.tables_in(scope) {
        let singled_out = has_singling_out_field(ctx, &view, scope, table);

        // Singling-out risk applies even when k is undefined.
        for policy in ctx.policies {
            if policy.singling_out_facet.is_some() && singled_out {
                out.push(Triple {
                    subject: table,
                    predicate: ctx.vocab.has_label,
                    object: policy.risk_label,
                    scope: Some(scope),
                });
            }
        }

        let Some(k) = table_k(ctx, &view, scope, table) else {
            continue;
        };

        let scope_text = ctx.pool.text(scope);
        let table_text = ctx.pool.text(table);
        let k_text = k.to_string();
        let node = skolem.derive(ctx.pool, &["kanon", &scope_text, &table_text, &k_text]);
        let k_lit = ctx.pool.intern(&k_text);
        out.push(Triple {
            subject: table,
            predicate: ctx.vocab.has_kanon_result,
            object: node,
            scope: Some(scope),
        });
        out.push(Triple {
            subject: node,
            predicate: ctx.vocab.k_value,
            object: k_lit,
            scope: Some(scope),
        });

        for policy in ctx.policies {
            if k < policy.threshold {
                out.push(Triple {
                    subject: table,
                    predicate: ctx.vocab.has_label,
                    object: policy.risk_label,
                    scope: Some(scope),
                });
            }
        }
    }
    out
}

/// Post-fixpoint pass: acceptance labels for tables whose k meets a
/// framework's threshold and whose singling-out check (where configured)
/// passes. Runs once, when facets are final.
pub fn acceptance_pass(ctx: &KAnonContext<'_>, scope: TermId) -> Vec<Triple> {
    let view = ctx.topology.view(scope);
    let mut out = Vec::new();

    for table in ctx.topology.tables_in(scope) {
        let Some(k) = table_k(ctx, &view, scope, table) else {
            continue;
        };
        let singled_out = has_singling_out_field(ctx, &view, scope, table);
        for policy in ctx.policies {
            if k < policy.threshold {
                continue;
            }
            if policy.singling_out_facet.is_some() && singled_out {
                continue;
            }
            out.push(Triple {
                subject: table,
                predicate: ctx.vocab.has_label,
                object: policy.acceptance_label,
                scope: Some(scope),
            });
        }
    }
    out
}

/// The k value for a table in a scope: the authored `declaredK` wins,
/// otherwise the registered sample is grouped. `None` when the table has no
/// quasi-identifiers or no k source.
fn table_k(
    ctx: &KAnonContext<'_>,
    view: &ScopeView<'_>,
    scope: TermId,
    table: TermId,
) -> Option<u32> {
    let quasi = quasi_identifiers(ctx, view, scope, table);
    if quasi.is_empty() {
        return None;
    }
    if let Some(declared) = declared_k(ctx, view, table) {
        return Some(declared);
    }
    ctx.samples.get(table).and_then(|s| s.k_for(&quasi))
}

/// Quasi-identifier fields: children with `IndirectIdentifier`, excluding
/// internal surrogate keys.
fn quasi_identifiers(
    ctx: &KAnonContext<'_>,
    view: &ScopeView<'_>,
    scope: TermId,
    table: TermId,
) -> Vec<TermId> {
    let indirect = ctx.pool.intern("IndirectIdentifier");
    let internal = ctx.pool.intern("InternalIdentifier");
    ctx.topology
        .children_of(table)
        .iter()
        .copied()
        .filter(|&f| ctx.topology.kind_of(f) == Some(ContainerKind::Field))
        .filter(|&f| view.member(f))
        .filter(|&f| field_has_facet(ctx, scope, f, indirect))
        .filter(|&f| !field_has_facet(ctx, scope, f, internal))
        .collect()
}

fn has_singling_out_field(
    ctx: &KAnonContext<'_>,
    view: &ScopeView<'_>,
    scope: TermId,
    table: TermId,
) -> bool {
    let unique = ctx.pool.intern("UniqueIdentifier");
    ctx.topology.children_of(table).iter().any(|&f| {
        ctx.topology.kind_of(f) == Some(ContainerKind::Field)
            && view.member(f)
            && field_has_facet(ctx, scope, f, unique)
    })
}

fn field_has_facet(ctx: &KAnonContext<'_>, scope: TermId, field: TermId, facet: TermId) -> bool {
    let plain = Triple::new(field, ctx.vocab.has_facet, facet);
    ctx.store.contains(&plain) || ctx.store.contains(&plain.in_scope(scope))
}

fn declared_k(ctx: &KAnonContext<'_>, view: &ScopeView<'_>, table: TermId) -> Option<u32> {
    ctx.store
        .with_predicate(ctx.vocab.declared_k)
        .into_iter()
        .filter(|t| t.subject == table && view.visible(t))
        .find_map(|t| ctx.pool.text(t.object).parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyBuilder;

    struct Fixture {
        pool: TermPool,
        vocab: Vocab,
        topology: Topology,
        store: GraphStore,
        samples: SampleStore,
        scope: TermId,
        table: TermId,
        zip: TermId,
        age: TermId,
        row_id: TermId,
    }

    fn fixture() -> Fixture {
        let pool = TermPool::new();
        let vocab = Vocab::resolve(&pool);
        let table = pool.intern("aggregated");
        let zip = pool.intern("zip");
        let age = pool.intern("age");
        let row_id = pool.intern("row_id");
        let scope = pool.intern("research");

        let mut b = TopologyBuilder::new();
        b.declare(table, ContainerKind::Table, None);
        b.declare(zip, ContainerKind::Field, Some(table));
        b.declare(age, ContainerKind::Field, Some(table));
        b.declare(row_id, ContainerKind::Field, Some(table));
        b.scope_member(scope, table);
        let topology = b.build(&pool).unwrap();

        let mut store = GraphStore::new();
        let indirect = pool.intern("IndirectIdentifier");
        let internal = pool.intern("InternalIdentifier");
        store.insert(Triple::new(zip, vocab.has_facet, indirect));
        store.insert(Triple::new(age, vocab.has_facet, indirect));
        // Surrogate key: indirect but internal, so not a quasi-identifier.
        store.insert(Triple::new(row_id, vocab.has_facet, indirect));
        store.insert(Triple::new(row_id, vocab.has_facet, internal));

        Fixture {
            pool,
            vocab,
            topology,
            store,
            samples: SampleStore::new(),
            scope,
            table,
            zip,
            age,
            row_id,
        }
    }

    fn policies(pool: &TermPool) -> Vec<KPolicy> {
        vec![
            KPolicy {
                threshold: 3,
                risk_label: pool.intern("hipaa:HighReidentificationRisk"),
                acceptance_label: pool.intern("hipaa:AcceptableDeidentification"),
                singling_out_facet: None,
            },
            KPolicy {
                threshold: 12,
                risk_label: pool.intern("ema:HighReidentificationRisk"),
                acceptance_label: pool.intern("ema:AcceptableDeidentification"),
                singling_out_facet: None,
            },
            KPolicy {
                threshold: 2,
                risk_label: pool.intern("italy:HighReidentificationRisk"),
                acceptance_label: pool.intern("italy:AcceptableDeidentification"),
                singling_out_facet: Some(pool.intern("UniqueIdentifier")),
            },
        ]
    }

    fn ctx<'a>(f: &'a Fixture, policies: &'a [KPolicy]) -> KAnonContext<'a> {
        KAnonContext {
            store: &f.store,
            topology: &f.topology,
            vocab: &f.vocab,
            pool: &f.pool,
            samples: &f.samples,
            policies,
        }
    }

    #[test]
    fn sample_k_groups_by_quasi_tuple() {
        let pool = TermPool::new();
        let zip = pool.intern("zip");
        let age = pool.intern("age");
        let sample = TableSample {
            columns: vec![zip, age],
            rows: vec![
                vec!["02139".into(), "34".into()],
                vec!["02139".into(), "34".into()],
                vec!["94110".into(), "61".into()],
            ],
        };
        assert_eq!(sample.k_for(&[zip, age]), Some(1));
        assert_eq!(sample.k_for(&[zip]), Some(1));
        assert_eq!(sample.k_for(&[]), None);
    }

    #[test]
    fn declared_k_wins_over_sample() {
        let mut f = fixture();
        let k3 = f.pool.intern("3");
        f.store
            .insert(Triple::new(f.table, f.vocab.declared_k, k3));
        f.samples.insert(
            f.table,
            TableSample {
                columns: vec![f.zip],
                rows: vec![vec!["1".into()]],
            },
        );
        let pol = policies(&f.pool);
        let out = round_pass(&ctx(&f, &pol), f.scope);

        // k = 3: below EMA's 12 only.
        let risks: Vec<String> = out
            .iter()
            .filter(|t| t.predicate == f.vocab.has_label)
            .map(|t| f.pool.text(t.object))
            .collect();
        assert_eq!(risks, vec!["ema:HighReidentificationRisk"]);
    }

    #[test]
    fn no_quasi_identifiers_no_output() {
        let pool = TermPool::new();
        let vocab = Vocab::resolve(&pool);
        let lonely = pool.intern("lonely");
        let scope = pool.intern("s");
        let mut b = TopologyBuilder::new();
        b.declare(lonely, ContainerKind::Table, None);
        b.scope_member(scope, lonely);
        let topology = b.build(&pool).unwrap();
        let store = GraphStore::new();
        let samples = SampleStore::new();
        let pol = policies(&pool);
        let ctx = KAnonContext {
            store: &store,
            topology: &topology,
            vocab: &vocab,
            pool: &pool,
            samples: &samples,
            policies: &pol,
        };
        assert!(round_pass(&ctx, scope).is_empty());
    }

    #[test]
    fn internal_identifier_excluded_from_quasi_set() {
        let f = fixture();
        let view = f.topology.view(f.scope);
        let pol = policies(&f.pool);
        let c = ctx(&f, &pol);
        let quasi = quasi_identifiers(&c, &view, f.scope, f.table);
        assert!(quasi.contains(&f.zip));
        assert!(quasi.contains(&f.age));
        assert!(!quasi.contains(&f.row_id));
    }

    #[test]
    fn result_node_is_stable_across_passes() {
        let mut f = fixture();
        let k3 = f.pool.intern("3");
        f.store
            .insert(Triple::new(f.table, f.vocab.declared_k, k3));
        let pol = policies(&f.pool);
        let first = round_pass(&ctx(&f, &pol), f.scope);
        let second = round_pass(&ctx(&f, &pol), f.scope);
        assert_eq!(first, second);
    }

    #[test]
    fn unique_field_triggers_singling_out_risk() {
        let mut f = fixture();
        let k3 = f.pool.intern("3");
        let unique = f.pool.intern("UniqueIdentifier");
        f.store
            .insert(Triple::new(f.table, f.vocab.declared_k, k3));
        f.store
            .insert(Triple::new(f.zip, f.vocab.has_facet, unique));
        let pol = policies(&f.pool);
        let out = round_pass(&ctx(&f, &pol), f.scope);
        let risks: Vec<String> = out
            .iter()
            .filter(|t| t.predicate == f.vocab.has_label)
            .map(|t| f.pool.text(t.object))
            .collect();
        // Italy fires on the unique field despite k = 3 >= 2.
        assert!(risks.contains(&"italy:HighReidentificationRisk".to_string()));
        assert!(risks.contains(&"ema:HighReidentificationRisk".to_string()));
        assert!(!risks.contains(&"hipaa:HighReidentificationRisk".to_string()));
    }

    #[test]
    fn acceptance_requires_threshold_and_singling_out_pass() {
        let mut f = fixture();
        let k3 = f.pool.intern("3");
        f.store
            .insert(Triple::new(f.table, f.vocab.declared_k, k3));
        let pol = policies(&f.pool);
        let out = acceptance_pass(&ctx(&f, &pol), f.scope);
        let accepts: Vec<String> = out.iter().map(|t| f.pool.text(t.object)).collect();
        // k = 3 meets HIPAA (3) and Italy (2, no unique field), not EMA (12).
        assert!(accepts.contains(&"hipaa:AcceptableDeidentification".to_string()));
        assert!(accepts.contains(&"italy:AcceptableDeidentification".to_string()));
        assert!(!accepts.contains(&"ema:AcceptableDeidentification".to_string()));

        // Add a unique field: Italy's acceptance disappears.
        let unique = f.pool.intern("UniqueIdentifier");
        f.store
            .insert(Triple::new(f.age, f.vocab.has_facet, unique));
        let out = acceptance_pass(&ctx(&f, &pol), f.scope);
        let accepts: Vec<String> = out.iter().map(|t| f.pool.text(t.object)).collect();
        assert!(!accepts.contains(&"italy:AcceptableDeidentification".to_string()));
    }

    #[test]
    fn sample_based_k_when_no_declared_value() {
        let mut f = fixture();
        f.samples.insert(
            f.table,
            TableSample {
                columns: vec![f.zip, f.age],
                rows: vec![
                    vec!["02139".into(), "34".into()],
                    vec!["02139".into(), "34".into()],
                    vec!["02139".into(), "34".into()],
                    vec!["94110".into(), "61".into()],
                ],
            },
        );
        let pol = policies(&f.pool);
        let out = round_pass(&ctx(&f, &pol), f.scope);
        // min group size is 1 (the 94110 row): every threshold trips.
        let risks: Vec<String> = out
            .iter()
            .filter(|t| t.predicate == f.vocab.has_label)
            .map(|t| f.pool.text(t.object))
            .collect();
        assert!(risks.contains(&"hipaa:HighReidentificationRisk".to_string()));
        assert!(risks.contains(&"ema:HighReidentificationRisk".to_string()));
        assert!(risks.contains(&"italy:HighReidentificationRisk".to_string()));
    }
}
