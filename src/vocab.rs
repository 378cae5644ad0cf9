//! Well-known vocabulary: engine predicates, container kinds, and the closed
//! facet set.
//!
//! All engine-owned terms live in the `pj:` namespace. Facets are unprefixed
//! and drawn from a closed vocabulary; referencing a facet outside this list
//! is a load-time configuration error.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::term::{TermId, TermPool};

/// The closed facet vocabulary: intrinsic, loader-asserted container
/// properties, plus the eighteen HIPAA Safe Harbor identifier facets.
pub const FACETS: &[&str] = &[
    // Core facets.
    "Individual",
    "Healthcare",
    "DirectIdentifier",
    "IndirectIdentifier",
    "InternalIdentifier",
    "UniqueIdentifier",
    "MomentData",
    "OpenGroup",
    // HIPAA Safe Harbor identifier facets.
    "Name",
    "GeographicSubdivision",
    "Dates",
    "TelephoneNumber",
    "FaxNumber",
    "EmailAddress",
    "SocialSecurityNumber",
    "MedicalRecordNumber",
    "HealthPlanNumber",
    "AccountNumber",
    "CertificateLicenseNumber",
    "VehicleIdentifier",
    "DeviceIdentifier",
    "WebUrl",
    "IpAddress",
    "BiometricIdentifier",
    "FullFacePhoto",
    "OtherUniqueIdentifier",
];

/// The eighteen Safe Harbor identifier facets, as a sub-slice of [`FACETS`].
pub const SAFE_HARBOR_FACETS: &[&str] = &[
    "Name",
    "GeographicSubdivision",
    "Dates",
    "TelephoneNumber",
    "FaxNumber",
    "EmailAddress",
    "SocialSecurityNumber",
    "MedicalRecordNumber",
    "HealthPlanNumber",
    "AccountNumber",
    "CertificateLicenseNumber",
    "VehicleIdentifier",
    "DeviceIdentifier",
    "WebUrl",
    "IpAddress",
    "BiometricIdentifier",
    "FullFacePhoto",
    "OtherUniqueIdentifier",
];

/// What kind of data artifact a container is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    Database,
    Table,
    Field,
}

impl ContainerKind {
    /// Parse a kind from its lowercase label.
    pub fn from_label(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "database" => Some(Self::Database),
            "table" => Some(Self::Table),
            "field" => Some(Self::Field),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database => write!(f, "database"),
            Self::Table => write!(f, "table"),
            Self::Field => write!(f, "field"),
        }
    }
}

/// Well-known predicate and kind terms, resolved once against the pool.
///
/// Holding resolved `TermId`s up front keeps the hot matching paths free of
/// string lookups.
#[derive(Debug, Clone)]
pub struct Vocab {
    /// `pj:kind` — container kind assertion.
    pub kind: TermId,
    /// `pj:hasFacet` — intrinsic (or inward-propagated) container property.
    pub has_facet: TermId,
    /// `pj:hasLabel` — framework-derived classification.
    pub has_label: TermId,
    /// `pj:contains` — parent→child containment edge.
    pub contains: TermId,
    /// `pj:joinableWith` — symmetric "tables joinable via some key" edge.
    pub joinable_with: TermId,
    /// `pj:declaredK` — authoring-time k value for a table.
    pub declared_k: TermId,
    /// `pj:hasKAnonymityResult` — table → skolemized result node.
    pub has_kanon_result: TermId,
    /// `pj:kValue` — result node → k literal.
    pub k_value: TermId,

    /// Kind object terms.
    pub database: TermId,
    pub table: TermId,
    pub field: TermId,

    facets: HashSet<TermId>,
}

impl Vocab {
    /// Resolve the vocabulary against a pool, interning as needed.
    pub fn resolve(pool: &TermPool) -> Self {
        let facets = FACETS.iter().map(|f| pool.intern(f)).collect();
        Self {
            kind: pool.intern("pj:kind"),
            has_facet: pool.intern("pj:hasFacet"),
            has_label: pool.intern("pj:hasLabel"),
            contains: pool.intern("pj:contains"),
            joinable_with: pool.intern("pj:joinableWith"),
            declared_k: pool.intern("pj:declaredK"),
            has_kanon_result: pool.intern("pj:hasKAnonymityResult"),
            k_value: pool.intern("pj:kValue"),
            database: pool.intern("database"),
            table: pool.intern("table"),
            field: pool.intern("field"),
            facets,
        }
    }

    /// Whether a term is in the closed facet vocabulary.
    pub fn is_facet(&self, term: TermId) -> bool {
        self.facets.contains(&term)
    }

    /// The object term for a container kind.
    pub fn kind_term(&self, kind: ContainerKind) -> TermId {
        match kind {
            ContainerKind::Database => self.database,
            ContainerKind::Table => self.table,
            ContainerKind::Field => self.field,
        }
    }

    /// Map a bare predicate name from the text formats to its term.
    ///
    /// Rule and query patterns write `hasFacet`, not `pj:hasFacet`.
    pub fn predicate_by_name(&self, name: &str) -> Option<TermId> {
        match name {
            "kind" => Some(self.kind),
            "hasFacet" => Some(self.has_facet),
            "hasLabel" => Some(self.has_label),
            "contains" => Some(self.contains),
            "joinableWith" => Some(self.joinable_with),
            "declaredK" => Some(self.declared_k),
            "hasKAnonymityResult" => Some(self.has_kanon_result),
            "kValue" => Some(self.k_value),
            _ => None,
        }
    }
}
