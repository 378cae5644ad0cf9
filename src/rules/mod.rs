//! Declarative rule model for framework bundles.
//!
//! Rules are data, not code — frameworks construct them programmatically
//! (see [`crate::frameworks`]) or load them from the bundle text format
//! (see [`crate::loader`]). The compiler in [`compile`] turns each rule into
//! a closed match-and-emit procedure.

pub mod compile;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::term::{self, TermId, TermPool};
use crate::vocab::{ContainerKind, Vocab};

// ---------------------------------------------------------------------------
// Rule term & triple pattern
// ---------------------------------------------------------------------------

/// A term in a rule pattern: a concrete term or a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleTerm {
    /// An already-interned concrete term.
    Concrete(TermId),
    /// A variable binding (e.g., `?x`).
    Variable(String),
}

impl RuleTerm {
    /// Returns `true` if this term is a variable.
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    /// Parse a term token. Variables start with `?`; predicate-position bare
    /// names are resolved through the vocabulary by the pattern parser, so
    /// everything else here is interned as a concrete term.
    pub fn parse(token: &str, pool: &TermPool) -> Self {
        let token = token.trim();
        match token.strip_prefix('?') {
            Some(var) => Self::Variable(var.to_string()),
            None => Self::Concrete(pool.intern(token)),
        }
    }
}

/// A triple pattern in a rule body, head, or query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: RuleTerm,
    pub predicate: RuleTerm,
    pub object: RuleTerm,
}

impl TriplePattern {
    /// Parse a pattern from `(?x hasFacet Healthcare)` syntax.
    ///
    /// Bare predicate names are mapped through the vocabulary (`hasFacet` →
    /// `pj:hasFacet`); unknown predicate names are interned as-is, which lets
    /// queries match loader-asserted auxiliary predicates.
    pub fn parse(s: &str, pool: &TermPool, vocab: &Vocab) -> Result<Self, RuleError> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        let parts: Vec<&str> = inner.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(RuleError::BadPattern {
                rule: String::new(),
                pattern: trimmed.to_string(),
                message: format!("expected 3 terms, got {}", parts.len()),
            });
        }
        let predicate = match parts[1].strip_prefix('?') {
            Some(var) => RuleTerm::Variable(var.to_string()),
            None => RuleTerm::Concrete(
                vocab
                    .predicate_by_name(parts[1])
                    .unwrap_or_else(|| pool.intern(parts[1])),
            ),
        };
        Ok(Self {
            subject: RuleTerm::parse(parts[0], pool),
            predicate,
            object: RuleTerm::parse(parts[2], pool),
        })
    }

    /// All variable names in this pattern.
    pub fn variables(&self) -> Vec<&str> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter_map(|t| match t {
                RuleTerm::Variable(v) => Some(v.as_str()),
                RuleTerm::Concrete(_) => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Propagation axes & child conditions
// ---------------------------------------------------------------------------

/// The relationship axis a propagation rule spreads along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Parent → children.
    Inward,
    /// Children → parent.
    Outward,
    /// Sibling → sibling (same parent).
    Peer,
    /// Across the symmetric joinable edge.
    Joinable,
}

impl Axis {
    /// Parse an axis from its lowercase label.
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "inward" => Some(Self::Inward),
            "outward" => Some(Self::Outward),
            "peer" => Some(Self::Peer),
            "joinable" => Some(Self::Joinable),
            _ => None,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inward => write!(f, "inward"),
            Self::Outward => write!(f, "outward"),
            Self::Peer => write!(f, "peer"),
            Self::Joinable => write!(f, "joinable"),
        }
    }
}

/// Which predicate a propagation rule spreads its term under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Carries {
    /// `pj:hasLabel` — framework classifications.
    Label,
    /// `pj:hasFacet` — intrinsic properties (Base spreads facets inward).
    Facet,
}

/// Which children a condition examines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildSelector {
    /// Any direct child.
    AnyChild,
    /// Only children of kind Field.
    FieldsOnly,
}

/// A positive existential condition over a container's children:
/// "some child (or some field child) of `?var` has facet F".
///
/// There is no absence form; conditions must stay monotone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub container_var: String,
    pub selector: ChildSelector,
    pub facet: TermId,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// The derivation a rule performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuleBody {
    /// Body conjunction ⟹ head templates. Fires once per distinct binding.
    Implication {
        body: Vec<TriplePattern>,
        head: Vec<TriplePattern>,
    },
    /// Implication gated on a child condition.
    Conditional {
        body: Vec<TriplePattern>,
        condition: Condition,
        head: Vec<TriplePattern>,
    },
    /// Spread a term along relationship axes, scope-locally.
    Propagation {
        term: TermId,
        carries: Carries,
        axes: Vec<Axis>,
    },
}

/// A single named rule within a framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub body: RuleBody,
}

impl Rule {
    /// Implication constructor.
    pub fn implication(
        name: impl Into<String>,
        body: Vec<TriplePattern>,
        head: Vec<TriplePattern>,
    ) -> Self {
        Self {
            name: name.into(),
            body: RuleBody::Implication { body, head },
        }
    }

    /// Conditional implication constructor.
    pub fn conditional(
        name: impl Into<String>,
        body: Vec<TriplePattern>,
        condition: Condition,
        head: Vec<TriplePattern>,
    ) -> Self {
        Self {
            name: name.into(),
            body: RuleBody::Conditional {
                body,
                condition,
                head,
            },
        }
    }

    /// Propagation constructor.
    pub fn propagation(
        name: impl Into<String>,
        term: TermId,
        carries: Carries,
        axes: Vec<Axis>,
    ) -> Self {
        Self {
            name: name.into(),
            body: RuleBody::Propagation {
                term,
                carries,
                axes,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// K-anonymity policy
// ---------------------------------------------------------------------------

/// A framework's registered k-anonymity thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KPolicy {
    /// Tables with k below this threshold get the risk label.
    pub threshold: u32,
    /// Risk label (framework-owned), e.g. `hipaa:HighReidentificationRisk`.
    pub risk_label: TermId,
    /// Acceptance label emitted post-fixpoint when the threshold is met.
    pub acceptance_label: TermId,
    /// Singling-out predicate: any field with this facet triggers the risk
    /// label regardless of k (Italy sets `UniqueIdentifier`).
    pub singling_out_facet: Option<TermId>,
}

// ---------------------------------------------------------------------------
// Framework
// ---------------------------------------------------------------------------

/// A named rule bundle owning a label namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Framework {
    pub name: String,
    /// Label namespace prefix this framework owns (equals `name` for the
    /// built-in bundles).
    pub namespace: String,
    pub rules: Vec<Rule>,
    pub k_policy: Option<KPolicy>,
}

impl Framework {
    /// Create an empty framework whose namespace equals its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            namespace: name.clone(),
            name,
            rules: Vec::new(),
            k_policy: None,
        }
    }

    /// Append a rule.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the k-anonymity policy.
    pub fn with_k_policy(mut self, policy: KPolicy) -> Self {
        self.k_policy = Some(policy);
        self
    }

    /// Validate the framework against the ownership and binding rules.
    ///
    /// - every head template minting a label uses a concrete label in this
    ///   framework's namespace (reading foreign labels in bodies is fine);
    /// - every head/condition variable is bound by the body;
    /// - propagated labels and k-policy labels are namespace-owned.
    pub fn validate(&self, pool: &TermPool, vocab: &Vocab) -> Result<(), RuleError> {
        for rule in &self.rules {
            match &rule.body {
                RuleBody::Implication { body, head } => {
                    self.validate_implication(&rule.name, body, head, None, pool, vocab)?;
                }
                RuleBody::Conditional {
                    body,
                    condition,
                    head,
                } => {
                    self.validate_implication(
                        &rule.name,
                        body,
                        head,
                        Some(condition),
                        pool,
                        vocab,
                    )?;
                }
                RuleBody::Propagation { term, carries, .. } => {
                    if *carries == Carries::Label {
                        self.check_owned(*term, pool)?;
                    }
                }
            }
        }
        if let Some(policy) = &self.k_policy {
            self.check_owned(policy.risk_label, pool)?;
            self.check_owned(policy.acceptance_label, pool)?;
        }
        Ok(())
    }

    fn validate_implication(
        &self,
        name: &str,
        body: &[TriplePattern],
        head: &[TriplePattern],
        condition: Option<&Condition>,
        pool: &TermPool,
        vocab: &Vocab,
    ) -> Result<(), RuleError> {
        if body.is_empty() {
            return Err(RuleError::EmptyBody { rule: name.into() });
        }
        let bound: Vec<&str> = body.iter().flat_map(|p| p.variables()).collect();
        for pattern in head {
            for var in pattern.variables() {
                if !bound.contains(&var) {
                    return Err(RuleError::UnboundHeadVariable {
                        rule: name.into(),
                        var: var.into(),
                    });
                }
            }
            if pattern.predicate == RuleTerm::Concrete(vocab.has_label) {
                match &pattern.object {
                    RuleTerm::Concrete(label) => self.check_owned(*label, pool)?,
                    RuleTerm::Variable(_) => {
                        return Err(RuleError::NonConcreteLabel { rule: name.into() });
                    }
                }
            }
        }
        if let Some(cond) = condition {
            if !bound.contains(&cond.container_var.as_str()) {
                return Err(RuleError::UnboundConditionVariable {
                    rule: name.into(),
                    var: cond.container_var.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_owned(&self, label: TermId, pool: &TermPool) -> Result<(), RuleError> {
        let text = pool.text(label);
        if term::namespace(&text) != Some(self.namespace.as_str()) {
            return Err(RuleError::LabelOwnership {
                framework: self.name.clone(),
                label: text,
            });
        }
        Ok(())
    }
}

/// Helpers for building rules programmatically.
pub mod build {
    use super::*;

    /// A variable term.
    pub fn var(name: &str) -> RuleTerm {
        RuleTerm::Variable(name.into())
    }

    /// A concrete term.
    pub fn term(id: TermId) -> RuleTerm {
        RuleTerm::Concrete(id)
    }

    /// A triple pattern from three terms.
    pub fn pat(subject: RuleTerm, predicate: RuleTerm, object: RuleTerm) -> TriplePattern {
        TriplePattern {
            subject,
            predicate,
            object,
        }
    }

    /// `(?var hasFacet <facet>)`.
    pub fn has_facet(vocab: &Vocab, v: &str, facet: TermId) -> TriplePattern {
        pat(var(v), term(vocab.has_facet), term(facet))
    }

    /// `(?var hasLabel <label>)`.
    pub fn has_label(vocab: &Vocab, v: &str, label: TermId) -> TriplePattern {
        pat(var(v), term(vocab.has_label), term(label))
    }

    /// `(?var kind <kind>)`.
    pub fn kind_is(vocab: &Vocab, v: &str, kind: ContainerKind) -> TriplePattern {
        pat(var(v), term(vocab.kind), term(vocab.kind_term(kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;

    fn setup() -> (TermPool, Vocab) {
        let pool = TermPool::new();
        let vocab = Vocab::resolve(&pool);
        (pool, vocab)
    }

    #[test]
    fn pattern_parse_basics() {
        let (pool, vocab) = setup();
        let pat = TriplePattern::parse("(?x hasFacet Healthcare)", &pool, &vocab).unwrap();
        assert!(matches!(pat.subject, RuleTerm::Variable(ref v) if v == "x"));
        assert_eq!(pat.predicate, RuleTerm::Concrete(vocab.has_facet));
        assert_eq!(pat.object, RuleTerm::Concrete(pool.lookup("Healthcare").unwrap()));
    }

    #[test]
    fn pattern_parse_bad_arity() {
        let (pool, vocab) = setup();
        let err = TriplePattern::parse("(?x hasFacet)", &pool, &vocab).unwrap_err();
        assert!(matches!(err, RuleError::BadPattern { .. }));
    }

    #[test]
    fn pattern_variables() {
        let (pool, vocab) = setup();
        let pat = TriplePattern::parse("(?x ?p ?y)", &pool, &vocab).unwrap();
        assert_eq!(pat.variables(), vec!["x", "p", "y"]);
    }

    #[test]
    fn axis_labels_round_trip() {
        for axis in [Axis::Inward, Axis::Outward, Axis::Peer, Axis::Joinable] {
            assert_eq!(Axis::from_label(&axis.to_string()), Some(axis));
        }
        assert_eq!(Axis::from_label("sideways"), None);
    }

    #[test]
    fn ownership_accepts_own_namespace() {
        let (pool, vocab) = setup();
        let phi = pool.intern("hipaa:PHI");
        let healthcare = pool.intern("Healthcare");
        let fw = Framework::new("hipaa").with_rule(Rule::implication(
            "phi",
            vec![has_facet(&vocab, "x", healthcare)],
            vec![has_label(&vocab, "x", phi)],
        ));
        assert!(fw.validate(&pool, &vocab).is_ok());
    }

    #[test]
    fn ownership_rejects_foreign_label() {
        let (pool, vocab) = setup();
        let phi = pool.intern("hipaa:PHI");
        let healthcare = pool.intern("Healthcare");
        let fw = Framework::new("gdpr").with_rule(Rule::implication(
            "sneaky",
            vec![has_facet(&vocab, "x", healthcare)],
            vec![has_label(&vocab, "x", phi)],
        ));
        let err = fw.validate(&pool, &vocab).unwrap_err();
        assert!(matches!(err, RuleError::LabelOwnership { .. }));
    }

    #[test]
    fn reading_foreign_labels_is_allowed() {
        let (pool, vocab) = setup();
        let phi = pool.intern("hipaa:PHI");
        let own = pool.intern("gdpr:PersonalData");
        let fw = Framework::new("gdpr").with_rule(Rule::implication(
            "react",
            vec![has_label(&vocab, "x", phi)],
            vec![has_label(&vocab, "x", own)],
        ));
        assert!(fw.validate(&pool, &vocab).is_ok());
    }

    #[test]
    fn unbound_head_variable_rejected() {
        let (pool, vocab) = setup();
        let healthcare = pool.intern("Healthcare");
        let own = pool.intern("f:L");
        let fw = Framework::new("f").with_rule(Rule::implication(
            "bad",
            vec![has_facet(&vocab, "x", healthcare)],
            vec![has_label(&vocab, "y", own)],
        ));
        let err = fw.validate(&pool, &vocab).unwrap_err();
        assert!(matches!(err, RuleError::UnboundHeadVariable { .. }));
    }

    #[test]
    fn unbound_condition_variable_rejected() {
        let (pool, vocab) = setup();
        let unique = pool.intern("UniqueIdentifier");
        let own = pool.intern("f:L");
        let fw = Framework::new("f").with_rule(Rule::conditional(
            "bad",
            vec![kind_is(&vocab, "t", ContainerKind::Table)],
            Condition {
                container_var: "other".into(),
                selector: ChildSelector::FieldsOnly,
                facet: unique,
            },
            vec![has_label(&vocab, "t", own)],
        ));
        let err = fw.validate(&pool, &vocab).unwrap_err();
        assert!(matches!(err, RuleError::UnboundConditionVariable { .. }));
    }

    #[test]
    fn propagating_foreign_label_rejected() {
        let (pool, vocab) = setup();
        let phi = pool.intern("hipaa:PHI");
        let fw = Framework::new("gdpr").with_rule(Rule::propagation(
            "spread",
            phi,
            Carries::Label,
            vec![Axis::Inward],
        ));
        let err = fw.validate(&pool, &vocab).unwrap_err();
        assert!(matches!(err, RuleError::LabelOwnership { .. }));
    }

    #[test]
    fn k_policy_labels_must_be_owned() {
        let (pool, vocab) = setup();
        let fw = Framework::new("ema").with_k_policy(KPolicy {
            threshold: 12,
            risk_label: pool.intern("hipaa:HighReidentificationRisk"),
            acceptance_label: pool.intern("ema:AcceptableDeidentification"),
            singling_out_facet: None,
        });
        let err = fw.validate(&pool, &vocab).unwrap_err();
        assert!(matches!(err, RuleError::LabelOwnership { .. }));
    }
}
