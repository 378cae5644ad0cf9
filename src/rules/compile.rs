//! Rule compiler: turns declarative rules into closed match-and-emit
//! procedures.
//!
//! A compiled rule declares the predicates it reads so the driver can skip
//! rules whose dependencies are absent from the current round's delta, and
//! exposes a single `fire` operation evaluated against one scope's view.

use std::collections::{HashMap, HashSet};

use crate::graph::{GraphStore, Triple};
use crate::term::TermId;
use crate::topology::{ScopeView, Topology};
use crate::vocab::{ContainerKind, Vocab};

use super::{
    Axis, Carries, ChildSelector, Condition, Rule, RuleBody, RuleTerm, TriplePattern,
};

/// Variable bindings accumulated while joining body patterns.
pub type Binding = HashMap<String, TermId>;

/// Everything a rule firing may read. Rules hold no state of their own.
pub struct EvalContext<'a> {
    pub store: &'a GraphStore,
    pub topology: &'a Topology,
    pub vocab: &'a Vocab,
    pub scope: TermId,
    pub delta: &'a [Triple],
    pub first_round: bool,
}

impl EvalContext<'_> {
    fn view(&self) -> ScopeView<'_> {
        self.topology.view(self.scope)
    }
}

enum Plan {
    Implication {
        body: Vec<TriplePattern>,
        condition: Option<Condition>,
        head: Vec<TriplePattern>,
    },
    Propagation {
        term: TermId,
        carries: Carries,
        axes: Vec<Axis>,
    },
}

/// A rule compiled to an executable form.
pub struct CompiledRule {
    /// Qualified id, `<framework>/<rule>`; also the skolem rule component.
    pub id: String,
    depends_on: HashSet<TermId>,
    depends_any: bool,
    plan: Plan,
}

impl CompiledRule {
    /// Compile one rule of a framework.
    pub fn compile(framework: &str, rule: &Rule, vocab: &Vocab) -> Self {
        let id = format!("{framework}/{}", rule.name);
        let mut depends_on = HashSet::new();
        let mut depends_any = false;

        let plan = match &rule.body {
            RuleBody::Implication { body, head } => {
                collect_dependencies(body, &mut depends_on, &mut depends_any);
                Plan::Implication {
                    body: body.clone(),
                    condition: None,
                    head: head.clone(),
                }
            }
            RuleBody::Conditional {
                body,
                condition,
                head,
            } => {
                collect_dependencies(body, &mut depends_on, &mut depends_any);
                // A newly derived facet can satisfy the condition after the
                // body last matched, so the condition facet predicate is a
                // dependency too.
                depends_on.insert(vocab.has_facet);
                Plan::Implication {
                    body: body.clone(),
                    condition: Some(condition.clone()),
                    head: head.clone(),
                }
            }
            RuleBody::Propagation {
                term,
                carries,
                axes,
            } => {
                depends_on.insert(match carries {
                    Carries::Label => vocab.has_label,
                    Carries::Facet => vocab.has_facet,
                });
                Plan::Propagation {
                    term: *term,
                    carries: *carries,
                    axes: axes.clone(),
                }
            }
        };

        Self {
            id,
            depends_on,
            depends_any,
            plan,
        }
    }

    /// Whether any predicate this rule reads occurs in the delta.
    pub fn triggered_by(&self, delta_predicates: &HashSet<TermId>) -> bool {
        self.depends_any || self.depends_on.iter().any(|p| delta_predicates.contains(p))
    }

    /// Evaluate the rule against one scope, producing candidate triples.
    ///
    /// Seminaive: unless this is the first round, at least one body pattern
    /// is pivoted through the delta. Duplicates are fine; the driver
    /// set-subtracts against the store before committing.
    pub fn fire(&self, ctx: &EvalContext) -> Vec<Triple> {
        match &self.plan {
            Plan::Implication {
                body,
                condition,
                head,
            } => self.fire_implication(ctx, body, condition.as_ref(), head),
            Plan::Propagation {
                term,
                carries,
                axes,
            } => fire_propagation(ctx, *term, *carries, axes),
        }
    }

    fn fire_implication(
        &self,
        ctx: &EvalContext,
        body: &[TriplePattern],
        condition: Option<&Condition>,
        head: &[TriplePattern],
    ) -> Vec<Triple> {
        let view = ctx.view();
        // A delta facet matching the condition re-opens every body match,
        // not just the ones that touch the delta.
        let condition_triggered = condition.is_some_and(|cond| {
            ctx.delta.iter().any(|t| {
                t.predicate == ctx.vocab.has_facet && t.object == cond.facet && view.visible(t)
            })
        });

        let mut bindings = Vec::new();
        if ctx.first_round || condition_triggered {
            bindings = join_body(ctx, &view, body, None);
        } else {
            for pivot in 0..body.len() {
                bindings.extend(join_body(ctx, &view, body, Some(pivot)));
            }
        }

        let mut out = Vec::new();
        for binding in bindings {
            if let Some(cond) = condition {
                if !condition_holds(ctx, &view, cond, &binding) {
                    continue;
                }
            }
            for template in head {
                if let Some(triple) = instantiate(ctx, &view, template, &binding) {
                    out.push(triple);
                }
            }
        }
        out
    }
}

fn collect_dependencies(
    body: &[TriplePattern],
    depends_on: &mut HashSet<TermId>,
    depends_any: &mut bool,
) {
    for pattern in body {
        match &pattern.predicate {
            RuleTerm::Concrete(p) => {
                depends_on.insert(*p);
            }
            RuleTerm::Variable(_) => *depends_any = true,
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern joining
// ---------------------------------------------------------------------------

/// Join all body patterns, optionally pivoting one through the delta.
fn join_body(
    ctx: &EvalContext,
    view: &ScopeView<'_>,
    body: &[TriplePattern],
    pivot: Option<usize>,
) -> Vec<Binding> {
    // Evaluate the pivot pattern first so its (usually small) delta match
    // restricts the rest of the join.
    let order: Vec<usize> = match pivot {
        Some(p) => std::iter::once(p)
            .chain((0..body.len()).filter(|&i| i != p))
            .collect(),
        None => (0..body.len()).collect(),
    };

    let mut results: Vec<Binding> = vec![Binding::new()];
    for idx in order {
        let pattern = &body[idx];
        let from_delta = pivot == Some(idx);
        let mut next = Vec::new();
        for binding in &results {
            let predicate = resolve_predicate(pattern, binding);
            let candidates: Vec<Triple> = if from_delta {
                ctx.delta
                    .iter()
                    .filter(|t| predicate.is_none_or(|p| t.predicate == p))
                    .copied()
                    .collect()
            } else {
                ctx.store.candidates(predicate)
            };
            for triple in candidates {
                if !view.visible(&triple) {
                    continue;
                }
                if let Some(extended) = match_extend(pattern, &triple, binding) {
                    next.push(extended);
                }
            }
        }
        results = next;
        if results.is_empty() {
            break;
        }
    }
    results
}

/// Resolve a pattern's predicate to a concrete term if possible.
pub(crate) fn resolve_predicate(pattern: &TriplePattern, binding: &Binding) -> Option<TermId> {
    match &pattern.predicate {
        RuleTerm::Concrete(p) => Some(*p),
        RuleTerm::Variable(v) => binding.get(v).copied(),
    }
}

/// Try to match one triple against a pattern, extending the binding.
pub(crate) fn match_extend(
    pattern: &TriplePattern,
    triple: &Triple,
    base: &Binding,
) -> Option<Binding> {
    let mut binding = base.clone();
    for (term, value) in [
        (&pattern.subject, triple.subject),
        (&pattern.predicate, triple.predicate),
        (&pattern.object, triple.object),
    ] {
        match term {
            RuleTerm::Concrete(id) => {
                if *id != value {
                    return None;
                }
            }
            RuleTerm::Variable(name) => match binding.get(name) {
                Some(&bound) if bound != value => return None,
                Some(_) => {}
                None => {
                    binding.insert(name.clone(), value);
                }
            },
        }
    }
    Some(binding)
}

fn condition_holds(
    ctx: &EvalContext,
    view: &ScopeView<'_>,
    condition: &Condition,
    binding: &Binding,
) -> bool {
    let Some(&container) = binding.get(&condition.container_var) else {
        return false;
    };
    ctx.topology.children_of(container).iter().any(|&child| {
        if condition.selector == ChildSelector::FieldsOnly
            && ctx.topology.kind_of(child) != Some(ContainerKind::Field)
        {
            return false;
        }
        if !view.member(child) {
            return false;
        }
        let plain = Triple::new(child, ctx.vocab.has_facet, condition.facet);
        ctx.store.contains(&plain) || ctx.store.contains(&plain.in_scope(ctx.scope))
    })
}

/// Instantiate a head template. Emitted triples carry the scope tag; a head
/// that would place a non-member container is dropped.
fn instantiate(
    ctx: &EvalContext,
    view: &ScopeView<'_>,
    template: &TriplePattern,
    binding: &Binding,
) -> Option<Triple> {
    let resolve = |term: &RuleTerm| -> Option<TermId> {
        match term {
            RuleTerm::Concrete(id) => Some(*id),
            RuleTerm::Variable(v) => binding.get(v).copied(),
        }
    };
    let triple = Triple {
        subject: resolve(&template.subject)?,
        predicate: resolve(&template.predicate)?,
        object: resolve(&template.object)?,
        scope: Some(ctx.scope),
    };
    for term in [triple.subject, triple.object] {
        if ctx.topology.is_container(term) && !view.member(term) {
            return None;
        }
    }
    Some(triple)
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

fn fire_propagation(
    ctx: &EvalContext,
    term: TermId,
    carries: Carries,
    axes: &[Axis],
) -> Vec<Triple> {
    let view = ctx.view();
    let predicate = match carries {
        Carries::Label => ctx.vocab.has_label,
        Carries::Facet => ctx.vocab.has_facet,
    };

    let sources: Vec<TermId> = if ctx.first_round {
        ctx.store
            .with_predicate(predicate)
            .into_iter()
            .filter(|t| t.object == term && view.visible(t))
            .map(|t| t.subject)
            .collect()
    } else {
        ctx.delta
            .iter()
            .filter(|t| t.predicate == predicate && t.object == term && view.visible(t))
            .map(|t| t.subject)
            .collect()
    };

    let mut out = Vec::new();
    for source in sources {
        for axis in axes {
            let targets: Vec<TermId> = match axis {
                Axis::Inward => ctx.topology.children_of(source).to_vec(),
                Axis::Outward => ctx.topology.parent_of(source).into_iter().collect(),
                Axis::Peer => ctx.topology.siblings_of(source),
                Axis::Joinable => ctx.topology.joinable_of(source).to_vec(),
            };
            for target in targets {
                if !view.member(target) {
                    continue;
                }
                out.push(Triple {
                    subject: target,
                    predicate,
                    object: term,
                    scope: Some(ctx.scope),
                });
            }
        }
    }
    out
}
