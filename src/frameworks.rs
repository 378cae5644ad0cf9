//! Built-in framework bundles: Base, HIPAA, GDPR, EMA, Italy.
//!
//! Frameworks are data consumed by the engine — the constructors here mirror
//! what a bundle file would declare (see [`crate::loader`] for the text
//! form). Base is always loaded; the regulatory bundles are opt-in.

use crate::rules::build::{has_facet, has_label, kind_is};
use crate::rules::{
    Axis, Carries, ChildSelector, Condition, Framework, KPolicy, Rule,
};
use crate::term::TermPool;
use crate::vocab::{ContainerKind, SAFE_HARBOR_FACETS, Vocab};

/// Names of the built-in frameworks, in load order.
pub const BUILTIN: &[&str] = &["base", "hipaa", "gdpr", "ema", "italy"];

/// Look up a built-in framework bundle by name.
pub fn by_name(name: &str, pool: &TermPool, vocab: &Vocab) -> Option<Framework> {
    match name {
        "base" => Some(base(pool, vocab)),
        "hipaa" => Some(hipaa(pool, vocab)),
        "gdpr" => Some(gdpr(pool, vocab)),
        "ema" => Some(ema(pool)),
        "italy" => Some(italy(pool, vocab)),
        _ => None,
    }
}

/// Base framework: context facets flow down the containment forest so that
/// a healthcare database's tables and fields inherit its context.
pub fn base(pool: &TermPool, _vocab: &Vocab) -> Framework {
    let mut fw = Framework::new("base");
    for facet in ["Healthcare", "Individual", "MomentData", "OpenGroup"] {
        fw = fw.with_rule(Rule::propagation(
            format!("{}-inward", facet.to_lowercase()),
            pool.intern(facet),
            Carries::Facet,
            vec![Axis::Inward],
        ));
    }
    fw
}

/// HIPAA: Safe Harbor identifiers, identifiability through joins, and PHI.
pub fn hipaa(pool: &TermPool, vocab: &Vocab) -> Framework {
    let safe_harbor = pool.intern("hipaa:SafeHarborIdentifier");
    let identifier = pool.intern("hipaa:HIPAAIdentifier");
    let phi = pool.intern("hipaa:PHI");
    let healthcare = pool.intern("Healthcare");
    let individual = pool.intern("Individual");
    let direct = pool.intern("DirectIdentifier");

    let mut fw = Framework::new("hipaa");

    // One implication per Safe Harbor identifier facet.
    for facet in SAFE_HARBOR_FACETS {
        fw = fw.with_rule(Rule::implication(
            format!("safe-harbor-{}", facet.to_lowercase()),
            vec![has_facet(vocab, "x", pool.intern(facet))],
            vec![has_label(vocab, "x", safe_harbor)],
        ));
    }

    fw.with_rule(Rule::implication(
        "safe-harbor-identifier",
        vec![has_label(vocab, "x", safe_harbor)],
        vec![has_label(vocab, "x", identifier)],
    ))
    .with_rule(Rule::implication(
        "direct-identifier",
        vec![has_facet(vocab, "x", direct)],
        vec![has_label(vocab, "x", identifier)],
    ))
    .with_rule(Rule::implication(
        "phi",
        vec![
            has_facet(vocab, "x", healthcare),
            has_facet(vocab, "x", individual),
            has_label(vocab, "x", identifier),
        ],
        vec![has_label(vocab, "x", phi)],
    ))
    // Identifiability spreads through join keys and up from fields.
    .with_rule(Rule::propagation(
        "identifier-spread",
        identifier,
        Carries::Label,
        vec![Axis::Outward, Axis::Joinable],
    ))
    // PHI taints everything reachable inside the scope.
    .with_rule(Rule::propagation(
        "phi-spread",
        phi,
        Carries::Label,
        vec![Axis::Inward, Axis::Outward, Axis::Peer, Axis::Joinable],
    ))
    // Expert Determination.
    .with_k_policy(KPolicy {
        threshold: 3,
        risk_label: pool.intern("hipaa:HighReidentificationRisk"),
        acceptance_label: pool.intern("hipaa:AcceptableDeidentification"),
        singling_out_facet: None,
    })
}

/// GDPR: personal data and the health special category; inward-only spread.
pub fn gdpr(pool: &TermPool, vocab: &Vocab) -> Framework {
    let personal = pool.intern("gdpr:PersonalData");
    let special = pool.intern("gdpr:SpecialCategoryData");
    let healthcare = pool.intern("Healthcare");
    let individual = pool.intern("Individual");

    Framework::new("gdpr")
        .with_rule(Rule::implication(
            "personal-data",
            vec![has_facet(vocab, "x", individual)],
            vec![has_label(vocab, "x", personal)],
        ))
        .with_rule(Rule::implication(
            "special-category-health",
            vec![
                has_facet(vocab, "x", healthcare),
                has_label(vocab, "x", personal),
            ],
            vec![has_label(vocab, "x", special)],
        ))
        .with_rule(Rule::propagation(
            "personal-data-inward",
            personal,
            Carries::Label,
            vec![Axis::Inward],
        ))
        .with_rule(Rule::propagation(
            "special-category-inward",
            special,
            Carries::Label,
            vec![Axis::Inward],
        ))
}

/// EMA: no labeling rules of its own, only the clinical-trial k threshold.
pub fn ema(pool: &TermPool) -> Framework {
    Framework::new("ema").with_k_policy(KPolicy {
        threshold: 12,
        risk_label: pool.intern("ema:HighReidentificationRisk"),
        acceptance_label: pool.intern("ema:AcceptableDeidentification"),
        singling_out_facet: None,
    })
}

/// Italy: singling-out via unique fields plus a k >= 2 baseline.
pub fn italy(pool: &TermPool, vocab: &Vocab) -> Framework {
    let risk = pool.intern("italy:HighReidentificationRisk");
    let unique = pool.intern("UniqueIdentifier");

    Framework::new("italy")
        .with_rule(Rule::conditional(
            "singling-out",
            vec![kind_is(vocab, "t", ContainerKind::Table)],
            Condition {
                container_var: "t".into(),
                selector: ChildSelector::FieldsOnly,
                facet: unique,
            },
            vec![has_label(vocab, "t", risk)],
        ))
        .with_k_policy(KPolicy {
            threshold: 2,
            risk_label: risk,
            acceptance_label: pool.intern("italy:AcceptableDeidentification"),
            singling_out_facet: Some(unique),
        })
}
