//! # parajudica
//!
//! A compliance-reasoning engine that assigns regulatory labels (PHI,
//! PersonalData, SpecialCategoryData, HighReidentificationRisk, ...) to
//! structured data artifacts — databases, tables, fields — under one or
//! more governance scopes, evaluated by one or more rule frameworks.
//!
//! ## Architecture
//!
//! - **Graph store** (`graph`): scope-tagged triples with predicate indexes
//!   and insertion-log deltas for seminaive evaluation
//! - **Rule model** (`rules`): declarative implication, conditional
//!   implication, and propagation rules compiled to match-and-emit procedures
//! - **Fixed-point driver** (`fixpoint`): seminaive monotone least fixpoint
//!   with per-scope evaluation and cooperative cancellation
//! - **K-anonymity** (`kanon`): per-table, per-scope anonymity-set analysis
//!   with per-framework thresholds
//! - **Frameworks** (`frameworks`): built-in Base / HIPAA / GDPR / EMA /
//!   Italy rule bundles
//!
//! ## Library usage
//!
//! ```no_run
//! use parajudica::engine::{Engine, EngineConfig};
//! use parajudica::vocab::ContainerKind;
//!
//! let mut engine = Engine::new(EngineConfig {
//!     frameworks: vec!["hipaa".into()],
//!     ..Default::default()
//! }).unwrap();
//! engine.declare_container("PatientInfo", ContainerKind::Table, None);
//! engine.assert_facets("PatientInfo", &["Healthcare", "Individual", "DirectIdentifier"]).unwrap();
//! engine.add_scope_member("Research", "PatientInfo");
//! let outcome = engine.run().unwrap();
//! assert!(outcome.converged);
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod export;
pub mod fixpoint;
pub mod frameworks;
pub mod graph;
pub mod kanon;
pub mod loader;
pub mod query;
pub mod rules;
pub mod skolem;
pub mod term;
pub mod topology;
pub mod vocab;
