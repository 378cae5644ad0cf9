//! Container topology: the containment forest, joinable edges, and scope
//! membership.
//!
//! Built once by the loader before inference and immutable during a run.
//! Scope membership is hereditary: a container belongs to a scope if it or
//! any containment ancestor is listed, so scopes authored at table
//! granularity still cover the tables' fields.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::LoadError;
use crate::graph::Triple;
use crate::term::{TermId, TermPool};
use crate::vocab::ContainerKind;

/// A container and its position in the forest.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: TermId,
    pub kind: ContainerKind,
    pub parent: Option<TermId>,
    pub children: Vec<TermId>,
}

/// Immutable view of the container forest, joinable edges, and scopes.
#[derive(Debug, Default)]
pub struct Topology {
    containers: HashMap<TermId, ContainerInfo>,
    joinable: HashMap<TermId, Vec<TermId>>,
    scope_members: HashMap<TermId, HashSet<TermId>>,
    scopes: Vec<TermId>,
}

impl Topology {
    /// Whether the term names a declared container.
    pub fn is_container(&self, term: TermId) -> bool {
        self.containers.contains_key(&term)
    }

    /// Container metadata, if declared.
    pub fn container(&self, term: TermId) -> Option<&ContainerInfo> {
        self.containers.get(&term)
    }

    /// Kind of a declared container.
    pub fn kind_of(&self, term: TermId) -> Option<ContainerKind> {
        self.containers.get(&term).map(|c| c.kind)
    }

    /// Parent of a container, if any.
    pub fn parent_of(&self, term: TermId) -> Option<TermId> {
        self.containers.get(&term).and_then(|c| c.parent)
    }

    /// Children of a container, in declaration order.
    pub fn children_of(&self, term: TermId) -> &[TermId] {
        self.containers
            .get(&term)
            .map(|c| c.children.as_slice())
            .unwrap_or(&[])
    }

    /// Siblings of a container: other children of the same parent.
    pub fn siblings_of(&self, term: TermId) -> Vec<TermId> {
        match self.parent_of(term) {
            Some(parent) => self
                .children_of(parent)
                .iter()
                .copied()
                .filter(|&c| c != term)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Joinable partners of a container (symmetric).
    pub fn joinable_of(&self, term: TermId) -> &[TermId] {
        self.joinable
            .get(&term)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All declared scopes, in id order.
    pub fn scopes(&self) -> &[TermId] {
        &self.scopes
    }

    /// Whether a container is a member of a scope (hereditary).
    pub fn in_scope(&self, container: TermId, scope: TermId) -> bool {
        self.scope_members
            .get(&scope)
            .is_some_and(|m| m.contains(&container))
    }

    /// Members of a scope, sorted by id.
    pub fn members_of(&self, scope: TermId) -> Vec<TermId> {
        let mut members: Vec<TermId> = self
            .scope_members
            .get(&scope)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// All containers, sorted by id.
    pub fn all_containers(&self) -> Vec<TermId> {
        let mut ids: Vec<TermId> = self.containers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Tables that are members of the given scope, sorted by id.
    pub fn tables_in(&self, scope: TermId) -> Vec<TermId> {
        self.members_of(scope)
            .into_iter()
            .filter(|&c| self.kind_of(c) == Some(ContainerKind::Table))
            .collect()
    }

    /// Scope-visibility predicate for a single scope.
    pub fn view(&self, scope: TermId) -> ScopeView<'_> {
        ScopeView {
            topology: self,
            scope,
        }
    }
}

/// Visibility predicate for one scope.
///
/// A triple is visible in scope S iff its tag is absent or S, and every
/// container it mentions is a member of S. This single check implements
/// scope isolation for rule bodies, child conditions, and propagation
/// sources alike.
#[derive(Debug, Clone, Copy)]
pub struct ScopeView<'a> {
    topology: &'a Topology,
    scope: TermId,
}

impl ScopeView<'_> {
    /// The scope this view filters for.
    pub fn scope(&self) -> TermId {
        self.scope
    }

    /// Whether the triple is visible in this scope.
    pub fn visible(&self, triple: &Triple) -> bool {
        if triple.scope.is_some_and(|s| s != self.scope) {
            return false;
        }
        self.mentions_only_members(triple)
    }

    /// Whether a container is a member of this scope.
    pub fn member(&self, container: TermId) -> bool {
        self.topology.in_scope(container, self.scope)
    }

    fn mentions_only_members(&self, triple: &Triple) -> bool {
        for term in [triple.subject, triple.object] {
            if self.topology.is_container(term) && !self.member(term) {
                return false;
            }
        }
        true
    }
}

/// Accumulates loader assertions and validates them into a [`Topology`].
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    declarations: Vec<(TermId, ContainerKind, Option<TermId>)>,
    joinable: Vec<(TermId, TermId)>,
    scope_listings: Vec<(TermId, TermId)>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a container with an optional parent.
    pub fn declare(&mut self, id: TermId, kind: ContainerKind, parent: Option<TermId>) {
        self.declarations.push((id, kind, parent));
    }

    /// Assert a joinable edge (stored symmetrically).
    pub fn joinable(&mut self, a: TermId, b: TermId) {
        self.joinable.push((a, b));
    }

    /// List a container as a member of a scope.
    pub fn scope_member(&mut self, scope: TermId, container: TermId) {
        self.scope_listings.push((scope, container));
    }

    /// Validate and build.
    ///
    /// Fails if any container is declared with two different parents or the
    /// containment edges form a cycle.
    pub fn build(self, pool: &TermPool) -> Result<Topology, LoadError> {
        let mut containers: HashMap<TermId, ContainerInfo> = HashMap::new();

        for (id, kind, parent) in &self.declarations {
            let entry = containers.entry(*id).or_insert_with(|| ContainerInfo {
                id: *id,
                kind: *kind,
                parent: None,
                children: Vec::new(),
            });
            entry.kind = *kind;
            if let Some(p) = parent {
                if entry.parent.is_some_and(|existing| existing != *p) {
                    return Err(LoadError::MultipleParents {
                        container: pool.text(*id),
                    });
                }
                entry.parent = Some(*p);
            }
        }

        // Wire children and a petgraph mirror for the cycle check.
        let mut forest: DiGraph<TermId, ()> = DiGraph::new();
        let mut nodes: HashMap<TermId, NodeIndex> = HashMap::new();
        for id in containers.keys() {
            nodes.insert(*id, forest.add_node(*id));
        }
        let edges: Vec<(TermId, TermId)> = containers
            .values()
            .filter_map(|c| c.parent.map(|p| (p, c.id)))
            .collect();
        for (parent, child) in edges {
            if let Some(info) = containers.get_mut(&parent) {
                info.children.push(child);
            }
            if let (Some(&p), Some(&c)) = (nodes.get(&parent), nodes.get(&child)) {
                forest.add_edge(p, c, ());
            }
        }
        for info in containers.values_mut() {
            info.children.sort();
        }

        if is_cyclic_directed(&forest) {
            // Name some container on a cycle: one whose ancestor chain never
            // terminates within the container count.
            let offender = containers
                .values()
                .find(|c| Self::on_cycle(&containers, c.id))
                .map(|c| pool.text(c.id))
                .unwrap_or_else(|| "?".into());
            return Err(LoadError::ContainmentCycle {
                container: offender,
            });
        }

        let mut joinable: HashMap<TermId, Vec<TermId>> = HashMap::new();
        for (a, b) in &self.joinable {
            joinable.entry(*a).or_default().push(*b);
            joinable.entry(*b).or_default().push(*a);
        }
        for partners in joinable.values_mut() {
            partners.sort();
            partners.dedup();
        }

        // Hereditary scope membership: expand each listing down the forest.
        let mut scope_members: HashMap<TermId, HashSet<TermId>> = HashMap::new();
        for (scope, container) in &self.scope_listings {
            let members = scope_members.entry(*scope).or_default();
            let mut queue = VecDeque::from([*container]);
            while let Some(c) = queue.pop_front() {
                if !members.insert(c) {
                    continue;
                }
                if let Some(info) = containers.get(&c) {
                    queue.extend(info.children.iter().copied());
                }
            }
        }
        let mut scopes: Vec<TermId> = scope_members.keys().copied().collect();
        scopes.sort();

        Ok(Topology {
            containers,
            joinable,
            scope_members,
            scopes,
        })
    }

    fn on_cycle(containers: &HashMap<TermId, ContainerInfo>, start: TermId) -> bool {
        let mut current = start;
        for _ in 0..=containers.len() {
            match containers.get(&current).and_then(|c| c.parent) {
                Some(parent) if parent == start => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }
}
