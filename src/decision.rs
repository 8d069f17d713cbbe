//! Routing Decision — the immutable record emitted by the Routing Policy.
//!
//! `Basis` is a tagged enum discriminant and `RoutingDecision` is a typed
//! record rather than a bag of loosely-typed strings.

use serde::Serialize;

use crate::{models::Tier, policy::OptimizationTarget};

/// Why a tier was chosen. `Display` renders the one-line explanation string
/// (`"optimization:<metric>"`, `"semantic:<name>"`, `"difficulty"`,
/// `"fallback:<metric> (preferred model failed)"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Basis {
    Optimization(OptimizationTarget),
    Semantic(String),
    Difficulty,
    FallbackAvailability,
}

impl Basis {
    /// `true` for the only branch that sets `predicted_semantic` — used to
    /// enforce the `predicted_semantic ≠ null ⇔ basis startswith "semantic:"`
    /// invariant at construction time rather than by convention.
    pub fn is_semantic(&self) -> bool {
        matches!(self, Self::Semantic(_))
    }
}

impl std::fmt::Display for Basis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Optimization(metric) => write!(f, "optimization:{metric}"),
            Self::Semantic(name) => write!(f, "semantic:{name}"),
            Self::Difficulty => f.write_str("difficulty"),
            Self::FallbackAvailability => {
                f.write_str("fallback:availability (preferred model failed)")
            }
        }
    }
}

impl Serialize for Basis {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Immutable record describing which tier was chosen and why. One per
/// completed request; never mutated after the Completion Driver returns it
/// to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub query: String,
    pub chosen_tier: Tier,
    pub chosen_model_name: String,
    pub predicted_semantic: Option<String>,
    pub optimization_target: Option<OptimizationTarget>,
    pub basis: Basis,
}

impl RoutingDecision {
    pub fn new(
        query: String,
        chosen_tier: Tier,
        chosen_model_name: String,
        optimization_target: Option<OptimizationTarget>,
        basis: Basis,
    ) -> Self {
        let predicted_semantic = match &basis {
            Basis::Semantic(name) => Some(name.clone()),
            _ => None,
        };
        Self {
            query,
            chosen_tier,
            chosen_model_name,
            predicted_semantic,
            optimization_target,
            basis,
        }
    }

    /// Build a new decision for the availability-fallback retry: same query
    /// and optimization target, opposite tier, `basis` rewritten to
    /// `FallbackAvailability`. The original decision is left untouched — the
    /// driver owns a *new* record, not a mutation.
    pub fn fallback(&self, new_tier: Tier, new_model_name: String) -> Self {
        Self::new(
            self.query.clone(),
            new_tier,
            new_model_name,
            self.optimization_target,
            Basis::FallbackAvailability,
        )
    }
}
