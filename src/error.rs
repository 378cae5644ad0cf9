//! Rich diagnostic error types for the parajudica engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text. All load-phase errors abort
//! the run before inference begins; the fixed-point driver itself has no
//! recoverable error conditions.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the parajudica engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum ParajudicaError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

/// Convenience alias for functions returning parajudica results.
pub type ParajudicaResult<T> = std::result::Result<T, ParajudicaError>;

// ---------------------------------------------------------------------------
// Load errors
// ---------------------------------------------------------------------------

/// Configuration errors raised while parsing and validating input files.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    #[diagnostic(
        code(pj::load::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}:{line}: {message}")]
    #[diagnostic(
        code(pj::load::syntax),
        help("Directives are `@container`, `@facet`, `@scope`, `@joinable`, `@k`, \
              `@sample`, `@framework`, `@rule`, `@kpolicy`.")
    )]
    Syntax {
        file: String,
        line: usize,
        message: String,
    },

    #[error("{file}:{line}: unknown facet `{facet}`")]
    #[diagnostic(
        code(pj::load::unknown_facet),
        help("Facets come from a closed vocabulary. Run `parajudica frameworks` \
              to list the recognized facet terms.")
    )]
    UnknownFacet {
        file: String,
        line: usize,
        facet: String,
    },

    #[error("{file}:{line}: unknown container kind `{kind}`")]
    #[diagnostic(
        code(pj::load::unknown_kind),
        help("Container kinds are `database`, `table`, and `field`.")
    )]
    UnknownContainerKind {
        file: String,
        line: usize,
        kind: String,
    },

    #[error("{file}:{line}: unknown propagation axis `{axis}`")]
    #[diagnostic(
        code(pj::load::unknown_axis),
        help("Propagation axes are `inward`, `outward`, `peer`, and `joinable`.")
    )]
    UnknownAxis {
        file: String,
        line: usize,
        axis: String,
    },

    #[error("{file}:{line}: unknown rule kind `{kind}`")]
    #[diagnostic(
        code(pj::load::unknown_rule_kind),
        help("Rule kinds are `Implication`, `ConditionalImplication`, and `Propagation`.")
    )]
    UnknownRuleKind {
        file: String,
        line: usize,
        kind: String,
    },

    #[error("{file}: framework bundle missing a `@framework <name>` directive")]
    #[diagnostic(
        code(pj::load::missing_framework),
        help("Every framework bundle must open with `@framework <name>` so the \
              engine knows which label namespace the bundle owns.")
    )]
    MissingFramework { file: String },

    #[error("{file}:{line}: sample row has {got} values, expected {expected}")]
    #[diagnostic(
        code(pj::load::sample_arity),
        help("Every row of a `@sample` block must provide one value per declared column.")
    )]
    SampleArity {
        file: String,
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("container `{container}` has more than one parent")]
    #[diagnostic(
        code(pj::load::multiple_parents),
        help("Containment is a forest: a database contains tables, a table \
              contains fields, and every container has at most one parent.")
    )]
    MultipleParents { container: String },

    #[error("containment cycle involving `{container}`")]
    #[diagnostic(
        code(pj::load::containment_cycle),
        help("Containment edges must not form a cycle. Inspect the `@container` \
              parent declarations along the reported chain.")
    )]
    ContainmentCycle { container: String },
}

// ---------------------------------------------------------------------------
// Rule errors
// ---------------------------------------------------------------------------

/// Errors raised while validating or compiling declarative rules.
#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule `{rule}`: pattern `{pattern}` is malformed: {message}")]
    #[diagnostic(
        code(pj::rule::bad_pattern),
        help("Triple patterns have exactly three terms: `(?x hasFacet Healthcare)`. \
              Variables start with `?`.")
    )]
    BadPattern {
        rule: String,
        pattern: String,
        message: String,
    },

    #[error("rule `{rule}` has an empty body")]
    #[diagnostic(
        code(pj::rule::empty_body),
        help("Implication rules need at least one body pattern to bind their variables.")
    )]
    EmptyBody { rule: String },

    #[error("rule `{rule}`: head variable `?{var}` is not bound by the body")]
    #[diagnostic(
        code(pj::rule::unbound_head),
        help("Every variable in a head template must occur in some body pattern.")
    )]
    UnboundHeadVariable { rule: String, var: String },

    #[error("rule `{rule}`: condition variable `?{var}` is not bound by the body")]
    #[diagnostic(
        code(pj::rule::unbound_condition),
        help("The container variable of a child condition must occur in some body pattern.")
    )]
    UnboundConditionVariable { rule: String, var: String },

    #[error("rule `{rule}` mints a non-concrete label")]
    #[diagnostic(
        code(pj::rule::non_concrete_label),
        help("The object of a `hasLabel` head template must be a concrete label \
              term so ownership can be checked at load time.")
    )]
    NonConcreteLabel { rule: String },

    #[error("framework `{framework}` may not mint label `{label}`")]
    #[diagnostic(
        code(pj::rule::label_ownership),
        help("A framework only creates labels in its own namespace; labels from \
              other frameworks may be read in rule bodies but never emitted.")
    )]
    LabelOwnership { framework: String, label: String },
}

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

/// Errors raised while parsing pattern queries.
#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("query `{query}` is malformed: {message}")]
    #[diagnostic(
        code(pj::query::syntax),
        help("Queries are comma-separated triple patterns: \
              `(?c hasLabel ?l), (?c hasFacet Healthcare)`.")
    )]
    Syntax { query: String, message: String },

    #[error("query has no patterns")]
    #[diagnostic(
        code(pj::query::empty),
        help("Provide at least one triple pattern to match against the store.")
    )]
    Empty,

    #[error("unknown scope `{scope}`")]
    #[diagnostic(
        code(pj::query::unknown_scope),
        help("The scope filter must name a scope declared by a `@scope` directive.")
    )]
    UnknownScope { scope: String },
}

// ---------------------------------------------------------------------------
// Cache errors
// ---------------------------------------------------------------------------

/// Errors raised by the content-addressed result cache.
#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    #[diagnostic(
        code(pj::cache::io),
        help("Check that the cache directory exists and is writable. Cache \
              entries are safe to delete at any time.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {message}")]
    #[diagnostic(
        code(pj::cache::serialize),
        help("The result store could not be serialized. This is a bug; please report it.")
    )]
    Serialize { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Errors raised by the engine facade.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("unknown framework `{name}`")]
    #[diagnostic(
        code(pj::engine::unknown_framework),
        help("Built-in frameworks are `base`, `hipaa`, `gdpr`, `ema`, and `italy`; \
              others must be loaded from a bundle file.")
    )]
    UnknownFramework { name: String },

    #[error("framework `{name}` is already loaded")]
    #[diagnostic(
        code(pj::engine::duplicate_framework),
        help("Each framework owns a label namespace and can be loaded only once.")
    )]
    DuplicateFramework { name: String },

    #[error("unknown container `{name}`")]
    #[diagnostic(
        code(pj::engine::unknown_container),
        help("Declare the container with `@container` (or `declare_container`) \
              before asserting facets or relations on it.")
    )]
    UnknownContainer { name: String },

    #[error("unknown facet `{facet}`")]
    #[diagnostic(
        code(pj::engine::unknown_facet),
        help("Facets come from a closed vocabulary; see `vocab::FACETS`.")
    )]
    UnknownFacet { facet: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_converts_to_parajudica_error() {
        let err = LoadError::MultipleParents {
            container: "PatientInfo".into(),
        };
        let top: ParajudicaError = err.into();
        assert!(matches!(
            top,
            ParajudicaError::Load(LoadError::MultipleParents { .. })
        ));
    }

    #[test]
    fn rule_error_converts_to_parajudica_error() {
        let err = RuleError::LabelOwnership {
            framework: "gdpr".into(),
            label: "hipaa:PHI".into(),
        };
        let top: ParajudicaError = err.into();
        assert!(matches!(
            top,
            ParajudicaError::Rule(RuleError::LabelOwnership { .. })
        ));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = LoadError::Syntax {
            file: "catalog.pj".into(),
            line: 12,
            message: "expected three terms".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("catalog.pj"));
        assert!(msg.contains("12"));
    }
}
