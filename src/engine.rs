//! Engine facade: top-level API for the parajudica system.
//!
//! The `Engine` owns the term pool, the graph store, the loaded frameworks,
//! and the staged catalog assertions. `run()` validates the staged input,
//! builds the topology, seeds the store, and drives the fixpoint; afterwards
//! the store answers pattern queries.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::error::{EngineError, ParajudicaResult, QueryError};
use crate::export::{self, ExportedTriple};
use crate::fixpoint::{FixpointConfig, FixpointDriver, FixpointOutcome, RunContext};
use crate::frameworks;
use crate::graph::{GraphStore, Triple};
use crate::kanon::{SampleStore, TableSample};
use crate::loader;
use crate::query::{Query, QueryAnswer};
use crate::rules::compile::CompiledRule;
use crate::rules::{Framework, KPolicy};
use crate::term::{TermId, TermPool};
use crate::topology::{Topology, TopologyBuilder};
use crate::vocab::{ContainerKind, Vocab};

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Framework bundles to load in addition to Base (always loaded).
    pub frameworks: Vec<String>,
    /// Evaluate scopes within a round in parallel.
    pub parallel: bool,
    /// Cooperative cancellation flag, checked at round boundaries.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frameworks: Vec::new(),
            parallel: true,
            cancel: None,
        }
    }
}

/// The parajudica compliance-reasoning engine.
pub struct Engine {
    config: EngineConfig,
    pool: TermPool,
    vocab: Vocab,
    frameworks: Vec<Framework>,

    // Staged catalog assertions, committed to the store by `run()`.
    containers: Vec<(TermId, ContainerKind, Option<TermId>)>,
    declared: HashSet<TermId>,
    facets: Vec<(TermId, TermId)>,
    scope_members: Vec<(TermId, TermId)>,
    joinable: Vec<(TermId, TermId)>,
    declared_k: Vec<(TermId, u32)>,
    samples: SampleStore,

    store: GraphStore,
    topology: Topology,
    outcome: Option<FixpointOutcome>,
}

impl Engine {
    /// Create an engine with Base plus the configured built-in frameworks.
    pub fn new(config: EngineConfig) -> ParajudicaResult<Self> {
        let pool = TermPool::new();
        let vocab = Vocab::resolve(&pool);

        let mut engine = Self {
            config: config.clone(),
            pool,
            vocab,
            frameworks: Vec::new(),
            containers: Vec::new(),
            declared: HashSet::new(),
            facets: Vec::new(),
            scope_members: Vec::new(),
            joinable: Vec::new(),
            declared_k: Vec::new(),
            samples: SampleStore::new(),
            store: GraphStore::new(),
            topology: Topology::default(),
            outcome: None,
        };

        let base = frameworks::by_name("base", &engine.pool, &engine.vocab)
            .expect("base framework is built in");
        engine.add_framework(base)?;
        for name in &config.frameworks {
            let fw = frameworks::by_name(name, &engine.pool, &engine.vocab).ok_or(
                EngineError::UnknownFramework { name: name.clone() },
            )?;
            engine.add_framework(fw)?;
        }
        Ok(engine)
    }

    /// Register a framework, validating ownership and bindings.
    pub fn add_framework(&mut self, framework: Framework) -> ParajudicaResult<()> {
        if self.frameworks.iter().any(|f| f.name == framework.name) {
            return Err(EngineError::DuplicateFramework {
                name: framework.name,
            }
            .into());
        }
        framework.validate(&self.pool, &self.vocab)?;
        tracing::debug!(framework = %framework.name, rules = framework.rules.len(), "framework loaded");
        self.frameworks.push(framework);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Catalog staging
    // -----------------------------------------------------------------------

    /// Declare a container, returning its term.
    pub fn declare_container(
        &mut self,
        name: &str,
        kind: ContainerKind,
        parent: Option<&str>,
    ) -> TermId {
        let id = self.pool.intern(name);
        let parent = parent.map(|p| self.pool.intern(p));
        self.declared.insert(id);
        self.containers.push((id, kind, parent));
        id
    }

    /// Assert facets on a container.
    pub fn assert_facets(&mut self, container: &str, facets: &[&str]) -> ParajudicaResult<()> {
        let id = self.pool.intern(container);
        for facet in facets {
            let term = self.pool.intern(facet);
            if !self.vocab.is_facet(term) {
                return Err(EngineError::UnknownFacet {
                    facet: (*facet).into(),
                }
                .into());
            }
            self.facets.push((id, term));
        }
        Ok(())
    }

    /// List a container as a member of a scope.
    pub fn add_scope_member(&mut self, scope: &str, container: &str) {
        let scope = self.pool.intern(scope);
        let container = self.pool.intern(container);
        self.scope_members.push((scope, container));
    }

    /// Assert a joinable edge between two tables.
    pub fn add_joinable(&mut self, a: &str, b: &str) {
        let a = self.pool.intern(a);
        let b = self.pool.intern(b);
        self.joinable.push((a, b));
    }

    /// Declare an authored k value for a table.
    pub fn set_declared_k(&mut self, table: &str, k: u32) {
        let table = self.pool.intern(table);
        self.declared_k.push((table, k));
    }

    /// Register a data sample for a table.
    pub fn add_sample(&mut self, table: &str, columns: &[&str], rows: Vec<Vec<String>>) {
        let table = self.pool.intern(table);
        let columns = columns.iter().map(|c| self.pool.intern(c)).collect();
        self.samples.insert(table, TableSample { columns, rows });
    }

    /// Load a data file's directives.
    pub fn load_data_str(&mut self, name: &str, text: &str) -> ParajudicaResult<()> {
        let data = loader::parse_data(text, name, &self.pool, &self.vocab)?;
        for (id, kind, parent) in data.containers {
            self.declared.insert(id);
            self.containers.push((id, kind, parent));
        }
        self.facets.extend(data.facets);
        self.scope_members.extend(data.scope_members);
        self.joinable.extend(data.joinable);
        self.declared_k.extend(data.declared_k);
        for (table, sample) in data.samples {
            self.samples.insert(table, sample);
        }
        Ok(())
    }

    /// Load a framework bundle from its text form.
    pub fn load_framework_str(&mut self, file: &str, text: &str) -> ParajudicaResult<()> {
        let framework = loader::parse_framework(text, file, &self.pool, &self.vocab)?;
        self.add_framework(framework)
    }

    // -----------------------------------------------------------------------
    // Inference
    // -----------------------------------------------------------------------

    /// Validate the staged catalog, build the topology, and seed the store
    /// with the initial assertions — everything `run()` does short of
    /// driving the fixpoint. Used on its own when replaying a cached result.
    pub fn prepare(&mut self) -> ParajudicaResult<()> {
        self.check_references()?;

        let mut builder = TopologyBuilder::new();
        for (id, kind, parent) in &self.containers {
            builder.declare(*id, *kind, *parent);
        }
        for (a, b) in &self.joinable {
            builder.joinable(*a, *b);
        }
        for (scope, member) in &self.scope_members {
            builder.scope_member(*scope, *member);
        }
        self.topology = builder.build(&self.pool)?;

        self.seed_store();
        Ok(())
    }

    /// Validate the staged catalog, build the topology, seed the store, and
    /// run the fixed-point driver.
    pub fn run(&mut self) -> ParajudicaResult<FixpointOutcome> {
        self.prepare()?;

        let compiled: Vec<CompiledRule> = self
            .frameworks
            .iter()
            .flat_map(|fw| {
                fw.rules
                    .iter()
                    .map(|rule| CompiledRule::compile(&fw.name, rule, &self.vocab))
            })
            .collect();
        let policies: Vec<KPolicy> = self
            .frameworks
            .iter()
            .filter_map(|fw| fw.k_policy.clone())
            .collect();

        tracing::info!(
            frameworks = self.frameworks.len(),
            rules = compiled.len(),
            containers = self.declared.len(),
            scopes = self.topology.scopes().len(),
            triples = self.store.len(),
            "starting inference"
        );

        let driver = FixpointDriver::new(
            compiled,
            FixpointConfig {
                parallel: self.config.parallel,
                cancel: self.config.cancel.clone(),
            },
        );
        let ctx = RunContext {
            topology: &self.topology,
            vocab: &self.vocab,
            pool: &self.pool,
            samples: &self.samples,
            policies: &policies,
        };
        let outcome = driver.run(&mut self.store, &ctx);
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    fn check_references(&self) -> ParajudicaResult<()> {
        let check = |id: TermId| -> ParajudicaResult<()> {
            if self.declared.contains(&id) {
                Ok(())
            } else {
                Err(EngineError::UnknownContainer {
                    name: self.pool.text(id),
                }
                .into())
            }
        };
        for (_, _, parent) in &self.containers {
            if let Some(p) = parent {
                check(*p)?;
            }
        }
        for (container, _) in &self.facets {
            check(*container)?;
        }
        for (_, member) in &self.scope_members {
            check(*member)?;
        }
        for (a, b) in &self.joinable {
            check(*a)?;
            check(*b)?;
        }
        for (table, _) in &self.declared_k {
            check(*table)?;
        }
        Ok(())
    }

    fn seed_store(&mut self) {
        for (id, kind, parent) in &self.containers {
            self.store.insert(Triple::new(
                *id,
                self.vocab.kind,
                self.vocab.kind_term(*kind),
            ));
            if let Some(p) = parent {
                self.store
                    .insert(Triple::new(*p, self.vocab.contains, *id));
            }
        }
        for (container, facet) in &self.facets {
            self.store
                .insert(Triple::new(*container, self.vocab.has_facet, *facet));
        }
        for (a, b) in &self.joinable {
            self.store
                .insert(Triple::new(*a, self.vocab.joinable_with, *b));
            self.store
                .insert(Triple::new(*b, self.vocab.joinable_with, *a));
        }
        for (table, k) in &self.declared_k {
            let lit = self.pool.intern(&k.to_string());
            self.store
                .insert(Triple::new(*table, self.vocab.declared_k, lit));
        }
    }

    // -----------------------------------------------------------------------
    // Queries & export
    // -----------------------------------------------------------------------

    /// Evaluate a pattern query, optionally restricted to one scope.
    pub fn query(&self, text: &str, scope: Option<&str>) -> ParajudicaResult<QueryAnswer> {
        let scope = match scope {
            Some(name) => {
                let id = self
                    .pool
                    .lookup(name)
                    .filter(|s| self.topology.scopes().contains(s))
                    .ok_or(QueryError::UnknownScope { scope: name.into() })?;
                Some(id)
            }
            None => None,
        };
        let query = Query::parse(text, &self.pool, &self.vocab)?;
        Ok(query.evaluate(&self.store, &self.topology, &self.pool, scope))
    }

    /// Labels derived for a container in a scope, sorted.
    pub fn labels_of(&self, container: &str, scope: &str) -> Vec<String> {
        self.tagged_objects(container, scope, self.vocab.has_label)
    }

    /// Facets visible on a container in a scope (asserted or derived), sorted.
    pub fn facets_of(&self, container: &str, scope: &str) -> Vec<String> {
        let mut facets = self.tagged_objects(container, scope, self.vocab.has_facet);
        if let Some(id) = self.pool.lookup(container) {
            for t in self.store.with_predicate(self.vocab.has_facet) {
                if t.subject == id && t.scope.is_none() {
                    facets.push(self.pool.text(t.object));
                }
            }
        }
        facets.sort();
        facets.dedup();
        facets
    }

    fn tagged_objects(&self, subject: &str, scope: &str, predicate: TermId) -> Vec<String> {
        let (Some(subject), Some(scope)) = (self.pool.lookup(subject), self.pool.lookup(scope))
        else {
            return Vec::new();
        };
        let mut out: Vec<String> = self
            .store
            .with_predicate(predicate)
            .into_iter()
            .filter(|t| t.subject == subject && t.scope == Some(scope))
            .map(|t| self.pool.text(t.object))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Sorted, label-resolved export of the store.
    pub fn export(&self) -> Vec<ExportedTriple> {
        export::export_store(&self.store, &self.pool)
    }

    /// Replay an export (e.g. a cache entry) into this engine's store.
    pub fn import(&mut self, entries: &[ExportedTriple]) {
        export::import_store(entries, &mut self.store, &self.pool);
    }

    /// Names of the loaded frameworks, in load order.
    pub fn framework_names(&self) -> Vec<&str> {
        self.frameworks.iter().map(|f| f.name.as_str()).collect()
    }

    /// The loaded frameworks.
    pub fn frameworks(&self) -> &[Framework] {
        &self.frameworks
    }

    /// Summary of the engine state.
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            frameworks: self
                .frameworks
                .iter()
                .map(|f| (f.name.clone(), f.rules.len()))
                .collect(),
            containers: self.declared.len(),
            scopes: self.topology.scopes().len(),
            triples: self.store.len(),
            rounds: self.outcome.as_ref().map(|o| o.rounds),
        }
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub frameworks: Vec<(String, usize)>,
    pub containers: usize,
    pub scopes: usize,
    pub triples: usize,
    pub rounds: Option<usize>,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "parajudica engine info")?;
        for (name, rules) in &self.frameworks {
            writeln!(f, "  framework:  {name} ({rules} rules)")?;
        }
        writeln!(f, "  containers: {}", self.containers)?;
        writeln!(f, "  scopes:     {}", self.scopes)?;
        writeln!(f, "  triples:    {}", self.triples)?;
        match self.rounds {
            Some(rounds) => writeln!(f, "  rounds:     {rounds}"),
            None => writeln!(f, "  rounds:     (not run)"),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("frameworks", &self.framework_names())
            .field("containers", &self.declared.len())
            .field("triples", &self.store.len())
            .finish()
    }
}
