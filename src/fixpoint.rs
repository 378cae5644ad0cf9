//! Seminaive fixed-point driver.
//!
//! Each round evaluates every compiled rule, per scope, against the previous
//! round's delta; newly derived triples are set-subtracted against the store
//! and committed in sorted order at the round boundary. The loop halts when
//! a round produces nothing new. Monotone rules over a finite vocabulary
//! guarantee termination; rule order inside a round cannot affect the final
//! store, so per-scope evaluation may fan out across threads.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::graph::{GraphStore, Triple};
use crate::kanon::{self, KAnonContext, SampleStore};
use crate::rules::KPolicy;
use crate::rules::compile::{CompiledRule, EvalContext};
use crate::term::{TermId, TermPool};
use crate::topology::Topology;
use crate::vocab::Vocab;

/// Driver configuration.
#[derive(Debug, Clone, Default)]
pub struct FixpointConfig {
    /// Evaluate scopes within a round on the rayon pool. Writes are buffered
    /// and merged at the round barrier either way, so this cannot change the
    /// final store.
    pub parallel: bool,
    /// Checked at the top of each round; when set, the driver returns the
    /// partial (monotone-consistent) store with `cancelled` marked.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// What a driver run produced.
#[derive(Debug, Clone)]
pub struct FixpointOutcome {
    /// Rounds executed, including the final quiescent one.
    pub rounds: usize,
    /// Triples added to the store by this run.
    pub new_triples: usize,
    /// Whether the run reached the least fixpoint.
    pub converged: bool,
    /// Whether the run was cancelled before convergence.
    pub cancelled: bool,
    /// Emission counts per rule id.
    pub rule_stats: HashMap<String, usize>,
}

/// Immutable inputs shared by every round.
pub struct RunContext<'a> {
    pub topology: &'a Topology,
    pub vocab: &'a Vocab,
    pub pool: &'a TermPool,
    pub samples: &'a SampleStore,
    pub policies: &'a [KPolicy],
}

/// The main loop: owns the compiled rules for one run.
pub struct FixpointDriver {
    rules: Vec<CompiledRule>,
    config: FixpointConfig,
}

impl FixpointDriver {
    pub fn new(rules: Vec<CompiledRule>, config: FixpointConfig) -> Self {
        Self { rules, config }
    }

    /// Run to quiescence (or cancellation), mutating the store in place.
    pub fn run(&self, store: &mut GraphStore, ctx: &RunContext<'_>) -> FixpointOutcome {
        let mut epoch = crate::graph::Epoch::default();
        let mut rounds = 0usize;
        let mut new_triples = 0usize;
        let mut rule_stats: HashMap<String, usize> = HashMap::new();
        let scopes: Vec<TermId> = ctx.topology.scopes().to_vec();

        loop {
            if self.is_cancelled() {
                tracing::info!(rounds, new_triples, "fixpoint cancelled");
                return FixpointOutcome {
                    rounds,
                    new_triples,
                    converged: false,
                    cancelled: true,
                    rule_stats,
                };
            }
            rounds += 1;
            let first_round = rounds == 1;

            let delta: Vec<Triple> = store.delta_since(epoch).to_vec();
            let delta_predicates: HashSet<TermId> =
                delta.iter().map(|t| t.predicate).collect();
            epoch = store.snapshot();

            let snapshot: &GraphStore = store;
            let eval_scope = |scope: TermId| -> (Vec<Triple>, Vec<(String, usize)>) {
                let ectx = EvalContext {
                    store: snapshot,
                    topology: ctx.topology,
                    vocab: ctx.vocab,
                    scope,
                    delta: &delta,
                    first_round,
                };
                let mut emitted = Vec::new();
                let mut stats = Vec::new();
                for rule in &self.rules {
                    if !first_round && !rule.triggered_by(&delta_predicates) {
                        continue;
                    }
                    let fired = rule.fire(&ectx);
                    if !fired.is_empty() {
                        stats.push((rule.id.clone(), fired.len()));
                    }
                    emitted.extend(fired);
                }
                let kctx = KAnonContext {
                    store: snapshot,
                    topology: ctx.topology,
                    vocab: ctx.vocab,
                    pool: ctx.pool,
                    samples: ctx.samples,
                    policies: ctx.policies,
                };
                emitted.extend(kanon::round_pass(&kctx, scope));
                (emitted, stats)
            };

            let results: Vec<(Vec<Triple>, Vec<(String, usize)>)> = if self.config.parallel {
                scopes.par_iter().map(|&s| eval_scope(s)).collect()
            } else {
                scopes.iter().map(|&s| eval_scope(s)).collect()
            };

            // Sorted commit keeps the insertion log deterministic.
            let mut fresh: BTreeSet<Triple> = BTreeSet::new();
            for (emitted, stats) in results {
                for (id, count) in stats {
                    *rule_stats.entry(id).or_insert(0) += count;
                }
                for triple in emitted {
                    if !store.contains(&triple) {
                        fresh.insert(triple);
                    }
                }
            }

            if fresh.is_empty() {
                tracing::debug!(rounds, "fixpoint reached");
                break;
            }
            tracing::debug!(round = rounds, new = fresh.len(), "fixpoint round");
            new_triples += fresh.len();
            for triple in fresh {
                store.insert(triple);
            }
        }

        // Acceptance labels contain an absence premise, so they are emitted
        // exactly once, against the closed store.
        let mut accepted: BTreeSet<Triple> = BTreeSet::new();
        for &scope in &scopes {
            let kctx = KAnonContext {
                store,
                topology: ctx.topology,
                vocab: ctx.vocab,
                pool: ctx.pool,
                samples: ctx.samples,
                policies: ctx.policies,
            };
            accepted.extend(kanon::acceptance_pass(&kctx, scope));
        }
        for triple in accepted {
            if store.insert(triple) {
                new_triples += 1;
            }
        }

        tracing::info!(rounds, new_triples, "fixpoint converged");
        FixpointOutcome {
            rounds,
            new_triples,
            converged: true,
            cancelled: false,
            rule_stats,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.config
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::build::{has_facet, has_label};
    use crate::rules::{Axis, Carries, Rule};
    use crate::topology::TopologyBuilder;
    use crate::vocab::ContainerKind;

    struct Fixture {
        pool: TermPool,
        vocab: Vocab,
        topology: Topology,
        store: GraphStore,
        samples: SampleStore,
        scope: TermId,
    }

    /// Three tables chained by joinable edges: a — b — c, all in one scope.
    fn chain_fixture() -> Fixture {
        let pool = TermPool::new();
        let vocab = Vocab::resolve(&pool);
        let a = pool.intern("a");
        let b_t = pool.intern("b");
        let c = pool.intern("c");
        let scope = pool.intern("s");

        let mut b = TopologyBuilder::new();
        for t in [a, b_t, c] {
            b.declare(t, ContainerKind::Table, None);
            b.scope_member(scope, t);
        }
        b.joinable(a, b_t);
        b.joinable(b_t, c);
        let topology = b.build(&pool).unwrap();

        Fixture {
            pool,
            vocab,
            topology,
            store: GraphStore::new(),
            samples: SampleStore::new(),
            scope,
        }
    }

    fn run_ctx<'a>(
        topology: &'a Topology,
        vocab: &'a Vocab,
        pool: &'a TermPool,
        samples: &'a SampleStore,
    ) -> RunContext<'a> {
        RunContext {
            topology,
            vocab,
            pool,
            samples,
            policies: &[],
        }
    }

    fn compile_all(rules: &[Rule], vocab: &Vocab) -> Vec<CompiledRule> {
        rules
            .iter()
            .map(|r| CompiledRule::compile("fw", r, vocab))
            .collect()
    }

    fn sorted_texts(f: &Fixture) -> Vec<String> {
        let mut texts: Vec<String> = f
            .store
            .iter()
            .map(|t| {
                format!(
                    "{} {} {} {}",
                    f.pool.text(t.subject),
                    f.pool.text(t.predicate),
                    f.pool.text(t.object),
                    t.scope.map(|s| f.pool.text(s)).unwrap_or_default()
                )
            })
            .collect();
        texts.sort();
        texts
    }

    #[test]
    fn joinable_chain_converges_over_rounds() {
        let mut f = chain_fixture();
        let label = f.pool.intern("fw:L");
        let a = f.pool.lookup("a").unwrap();
        let c = f.pool.lookup("c").unwrap();
        f.store
            .insert(Triple::new(a, f.vocab.has_label, label).in_scope(f.scope));

        let rules = compile_all(
            &[Rule::propagation("j", label, Carries::Label, vec![Axis::Joinable])],
            &f.vocab,
        );
        let driver = FixpointDriver::new(rules, FixpointConfig::default());
        let outcome = driver.run(&mut f.store, &run_ctx(&f.topology, &f.vocab, &f.pool, &f.samples));

        assert!(outcome.converged);
        assert!(!outcome.cancelled);
        // The label walked a → b → c, one hop per round, plus a quiescent round.
        assert!(
            f.store
                .contains(&Triple::new(c, f.vocab.has_label, label).in_scope(f.scope))
        );
        assert_eq!(outcome.new_triples, 2);
        assert!(outcome.rounds >= 3);
    }

    #[test]
    fn rerun_is_idempotent() {
        let mut f = chain_fixture();
        let label = f.pool.intern("fw:L");
        let a = f.pool.lookup("a").unwrap();
        f.store
            .insert(Triple::new(a, f.vocab.has_label, label).in_scope(f.scope));

        let rules = compile_all(
            &[Rule::propagation("j", label, Carries::Label, vec![Axis::Joinable])],
            &f.vocab,
        );
        let driver = FixpointDriver::new(rules, FixpointConfig::default());
        let first = driver.run(&mut f.store, &run_ctx(&f.topology, &f.vocab, &f.pool, &f.samples));
        assert!(first.new_triples > 0);
        let size = f.store.len();

        let second = driver.run(&mut f.store, &run_ctx(&f.topology, &f.vocab, &f.pool, &f.samples));
        assert!(second.converged);
        assert_eq!(second.new_triples, 0);
        assert_eq!(f.store.len(), size);
    }

    #[test]
    fn implication_chain_crosses_rounds() {
        let mut f = chain_fixture();
        let healthcare = f.pool.intern("Healthcare");
        let l1 = f.pool.intern("fw:First");
        let l2 = f.pool.intern("fw:Second");
        let a = f.pool.lookup("a").unwrap();
        f.store
            .insert(Triple::new(a, f.vocab.has_facet, healthcare));

        let rules = compile_all(
            &[
                Rule::implication(
                    "one",
                    vec![has_facet(&f.vocab, "x", healthcare)],
                    vec![has_label(&f.vocab, "x", l1)],
                ),
                Rule::implication(
                    "two",
                    vec![has_label(&f.vocab, "x", l1)],
                    vec![has_label(&f.vocab, "x", l2)],
                ),
            ],
            &f.vocab,
        );
        let driver = FixpointDriver::new(rules, FixpointConfig::default());
        let outcome = driver.run(&mut f.store, &run_ctx(&f.topology, &f.vocab, &f.pool, &f.samples));

        assert!(outcome.converged);
        assert!(
            f.store
                .contains(&Triple::new(a, f.vocab.has_label, l2).in_scope(f.scope))
        );
        assert_eq!(outcome.rule_stats.get("fw/one"), Some(&1));
    }

    #[test]
    fn rule_order_does_not_change_final_store() {
        let build = |reversed: bool| {
            let mut f = chain_fixture();
            let label = f.pool.intern("fw:L");
            let healthcare = f.pool.intern("Healthcare");
            let a = f.pool.lookup("a").unwrap();
            f.store
                .insert(Triple::new(a, f.vocab.has_facet, healthcare));
            let mut rules = vec![
                Rule::implication(
                    "derive",
                    vec![has_facet(&f.vocab, "x", healthcare)],
                    vec![has_label(&f.vocab, "x", label)],
                ),
                Rule::propagation("spread", label, Carries::Label, vec![Axis::Joinable]),
            ];
            if reversed {
                rules.reverse();
            }
            let compiled = compile_all(&rules, &f.vocab);
            let driver = FixpointDriver::new(compiled, FixpointConfig::default());
            driver.run(&mut f.store, &run_ctx(&f.topology, &f.vocab, &f.pool, &f.samples));
            sorted_texts(&f)
        };
        assert_eq!(build(false), build(true));
    }

    #[test]
    fn axis_order_does_not_change_final_store() {
        let build = |axes: Vec<Axis>| {
            let pool = TermPool::new();
            let vocab = Vocab::resolve(&pool);
            let parent = pool.intern("parent");
            let child1 = pool.intern("child1");
            let child2 = pool.intern("child2");
            let scope = pool.intern("s");
            let mut b = TopologyBuilder::new();
            b.declare(parent, ContainerKind::Table, None);
            b.declare(child1, ContainerKind::Field, Some(parent));
            b.declare(child2, ContainerKind::Field, Some(parent));
            b.scope_member(scope, parent);
            let topology = b.build(&pool).unwrap();

            let label = pool.intern("fw:L");
            let mut store = GraphStore::new();
            store.insert(Triple::new(child1, vocab.has_label, label).in_scope(scope));

            let rule = Rule::propagation("all", label, Carries::Label, axes);
            let compiled = vec![CompiledRule::compile("fw", &rule, &vocab)];
            let driver = FixpointDriver::new(compiled, FixpointConfig::default());
            let samples = SampleStore::new();
            let ctx = RunContext {
                topology: &topology,
                vocab: &vocab,
                pool: &pool,
                samples: &samples,
                policies: &[],
            };
            driver.run(&mut store, &ctx);
            let mut texts: Vec<(u32, u32, u32)> = store
                .iter()
                .map(|t| (t.subject.get(), t.predicate.get(), t.object.get()))
                .collect();
            texts.sort();
            texts
        };
        let forward = build(vec![Axis::Inward, Axis::Outward, Axis::Peer]);
        let backward = build(vec![Axis::Peer, Axis::Outward, Axis::Inward]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let build = |parallel: bool| {
            let mut f = chain_fixture();
            let label = f.pool.intern("fw:L");
            let a = f.pool.lookup("a").unwrap();
            f.store
                .insert(Triple::new(a, f.vocab.has_label, label).in_scope(f.scope));
            let rules = compile_all(
                &[Rule::propagation("j", label, Carries::Label, vec![Axis::Joinable])],
                &f.vocab,
            );
            let driver = FixpointDriver::new(
                rules,
                FixpointConfig {
                    parallel,
                    cancel: None,
                },
            );
            driver.run(&mut f.store, &run_ctx(&f.topology, &f.vocab, &f.pool, &f.samples));
            sorted_texts(&f)
        };
        assert_eq!(build(true), build(false));
    }

    #[test]
    fn cancellation_returns_partial_store() {
        let mut f = chain_fixture();
        let flag = Arc::new(AtomicBool::new(true));
        let driver = FixpointDriver::new(
            Vec::new(),
            FixpointConfig {
                parallel: false,
                cancel: Some(Arc::clone(&flag)),
            },
        );
        let outcome = driver.run(&mut f.store, &run_ctx(&f.topology, &f.vocab, &f.pool, &f.samples));
        assert!(outcome.cancelled);
        assert!(!outcome.converged);
        assert_eq!(outcome.rounds, 0);
    }

    #[test]
    fn empty_store_converges_immediately() {
        let mut f = chain_fixture();
        let driver = FixpointDriver::new(Vec::new(), FixpointConfig::default());
        let outcome = driver.run(&mut f.store, &run_ctx(&f.topology, &f.vocab, &f.pool, &f.samples));
        assert!(outcome.converged);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.new_triples, 0);
    }
}
