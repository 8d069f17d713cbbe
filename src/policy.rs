//! Routing Policy — the fixed three-step precedence that picks a tier for a
//! single query.
//!
//! An explicit `optimization_factor` short-circuits straight to a tier;
//! otherwise the semantic router is tried first, and only when it has no
//! match does the difficulty scorer run. Returns a typed [`RoutingDecision`],
//! and takes the embedding client and difficulty scorer as injected trait
//! objects rather than constructing them internally.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    decision::{Basis, RoutingDecision},
    difficulty::DifficultyScorer,
    error::AppError,
    models::{ModelPair, Tier},
    semantic::SemanticClassifier,
};

/// The `optimization_metric` wire value. `Performance` always picks the
/// strong tier, `Cost` always picks the weak tier, `Latency` picks whichever
/// descriptor in the pair advertises the higher `simulated_throughput` (ties
/// favor `Weak`), and `Availability` is not itself a tier choice — it only
/// enables the fallback-on-failure behavior the Completion Driver performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationTarget {
    Performance,
    Cost,
    Latency,
    Availability,
}

impl std::fmt::Display for OptimizationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Performance => "performance",
            Self::Cost => "cost",
            Self::Latency => "latency",
            Self::Availability => "availability",
        })
    }
}

/// Injected classifiers plus the fixed precedence that combines them.
///
/// Construction is cheap (two `Arc` clones); the expensive part — embedding
/// calls — only happens inside `decide` when the semantic or difficulty path
/// is actually reached.
pub struct RoutingPolicy {
    difficulty_scorer: Arc<dyn DifficultyScorer>,
}

impl RoutingPolicy {
    pub fn new(difficulty_scorer: Arc<dyn DifficultyScorer>) -> Self {
        Self { difficulty_scorer }
    }

    /// Decide which tier answers `query`.
    ///
    /// `optimization_target`, when `Some(Performance | Cost | Latency)`,
    /// short-circuits before either classifier runs — `Availability` does
    /// not, since it governs retry behavior rather than tier choice and
    /// falls through to the semantic/difficulty path like `None`.
    ///
    /// `semantic` is `None` when the request carried no `semantics` routes;
    /// in that case the difficulty path runs directly, matching
    /// `route_query`'s behavior when no `RouteLayer` match occurs.
    pub async fn decide(
        &self,
        query: &str,
        model_pair: &ModelPair,
        optimization_target: Option<OptimizationTarget>,
        semantic: Option<&SemanticClassifier>,
    ) -> Result<RoutingDecision, AppError> {
        if let Some(target) = optimization_target {
            if let Some(tier) = Self::tier_for_optimization(target, model_pair) {
                let model = model_pair.get(tier);
                return Ok(RoutingDecision::new(
                    query.to_string(),
                    tier,
                    model.name.clone(),
                    Some(target),
                    Basis::Optimization(target),
                ));
            }
        }

        if let Some(classifier) = semantic {
            match classifier.classify(query).await {
                Ok(Some(route_name)) => {
                    let tier = classifier.tier_for(&route_name).ok_or_else(|| {
                        AppError::Internal(format!("matched unknown semantic route {route_name}"))
                    })?;
                    let model = model_pair.get(tier);
                    return Ok(RoutingDecision::new(
                        query.to_string(),
                        tier,
                        model.name.clone(),
                        optimization_target,
                        Basis::Semantic(route_name),
                    ));
                }
                Ok(None) => {}
                // Semantic step unavailable — fall through to the difficulty
                // classifier instead of failing the whole request.
                Err(AppError::ExternalDependency(_)) => {}
                Err(other) => return Err(other),
            }
        }

        let score = self.difficulty_scorer.score(query).await?;
        let tier = if score >= crate::difficulty::DIFFICULTY_THRESHOLD {
            Tier::Strong
        } else {
            Tier::Weak
        };
        let model = model_pair.get(tier);
        Ok(RoutingDecision::new(
            query.to_string(),
            tier,
            model.name.clone(),
            optimization_target,
            Basis::Difficulty,
        ))
    }

    /// `None` for `Availability`, which is not a tier-choosing target.
    fn tier_for_optimization(target: OptimizationTarget, model_pair: &ModelPair) -> Option<Tier> {
        match target {
            OptimizationTarget::Performance => Some(Tier::Strong),
            OptimizationTarget::Cost => Some(Tier::Weak),
            OptimizationTarget::Latency => {
                let strong_throughput = model_pair.strong.simulated_throughput.unwrap_or(0.0);
                let weak_throughput = model_pair.weak.simulated_throughput.unwrap_or(0.0);
                Some(if strong_throughput > weak_throughput {
                    Tier::Strong
                } else {
                    Tier::Weak
                })
            }
            OptimizationTarget::Availability => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelDescriptor;
    use async_trait::async_trait;

    fn descriptor(name: &str, throughput: Option<f64>) -> ModelDescriptor {
        ModelDescriptor {
            name: name.into(),
            provider: None,
            base_url: None,
            api_key: None,
            simulated_throughput: throughput,
        }
    }

    fn pair(strong_throughput: Option<f64>, weak_throughput: Option<f64>) -> ModelPair {
        ModelPair {
            strong: descriptor("gpt-4o", strong_throughput),
            weak: descriptor("llama3:8b", weak_throughput),
        }
    }

    struct PanicScorer;

    #[async_trait]
    impl DifficultyScorer for PanicScorer {
        async fn score(&self, _query: &str) -> Result<f64, AppError> {
            panic!("difficulty scorer must not be consulted when optimization short-circuits");
        }
    }

    fn policy_with_panicking_scorer() -> RoutingPolicy {
        RoutingPolicy::new(Arc::new(PanicScorer))
    }

    #[tokio::test]
    async fn performance_always_picks_strong_without_consulting_classifiers() {
        let policy = policy_with_panicking_scorer();
        let decision = policy
            .decide(
                "hello",
                &pair(None, None),
                Some(OptimizationTarget::Performance),
                None,
            )
            .await
            .unwrap();
        assert_eq!(decision.chosen_tier, Tier::Strong);
        assert_eq!(decision.basis, Basis::Optimization(OptimizationTarget::Performance));
    }

    #[tokio::test]
    async fn cost_always_picks_weak_without_consulting_classifiers() {
        let policy = policy_with_panicking_scorer();
        let decision = policy
            .decide("hello", &pair(None, None), Some(OptimizationTarget::Cost), None)
            .await
            .unwrap();
        assert_eq!(decision.chosen_tier, Tier::Weak);
    }

    #[tokio::test]
    async fn latency_picks_higher_throughput_tier() {
        let policy = policy_with_panicking_scorer();
        let decision = policy
            .decide(
                "hello",
                &pair(Some(50.0), Some(120.0)),
                Some(OptimizationTarget::Latency),
                None,
            )
            .await
            .unwrap();
        assert_eq!(decision.chosen_tier, Tier::Weak);
    }

    #[tokio::test]
    async fn latency_ties_favor_weak() {
        let policy = policy_with_panicking_scorer();
        let decision = policy
            .decide(
                "hello",
                &pair(Some(100.0), Some(100.0)),
                Some(OptimizationTarget::Latency),
                None,
            )
            .await
            .unwrap();
        assert_eq!(decision.chosen_tier, Tier::Weak);
    }

    #[tokio::test]
    async fn availability_falls_through_to_difficulty_path() {
        struct FixedScorer(f64);
        #[async_trait]
        impl DifficultyScorer for FixedScorer {
            async fn score(&self, _query: &str) -> Result<f64, AppError> {
                Ok(self.0)
            }
        }
        let policy = RoutingPolicy::new(Arc::new(FixedScorer(0.9)));
        let decision = policy
            .decide(
                "hello",
                &pair(None, None),
                Some(OptimizationTarget::Availability),
                None,
            )
            .await
            .unwrap();
        assert_eq!(decision.chosen_tier, Tier::Strong);
        assert_eq!(decision.basis, Basis::Difficulty);
        assert_eq!(decision.optimization_target, Some(OptimizationTarget::Availability));
    }

    #[tokio::test]
    async fn difficulty_threshold_boundary_is_inclusive_of_strong() {
        struct FixedScorer(f64);
        #[async_trait]
        impl DifficultyScorer for FixedScorer {
            async fn score(&self, _query: &str) -> Result<f64, AppError> {
                Ok(self.0)
            }
        }
        let policy = RoutingPolicy::new(Arc::new(FixedScorer(crate::difficulty::DIFFICULTY_THRESHOLD)));
        let decision = policy.decide("hello", &pair(None, None), None, None).await.unwrap();
        assert_eq!(decision.chosen_tier, Tier::Strong);
    }

    #[tokio::test]
    async fn below_threshold_picks_weak() {
        struct FixedScorer(f64);
        #[async_trait]
        impl DifficultyScorer for FixedScorer {
            async fn score(&self, _query: &str) -> Result<f64, AppError> {
                Ok(self.0)
            }
        }
        let policy = RoutingPolicy::new(Arc::new(FixedScorer(
            crate::difficulty::DIFFICULTY_THRESHOLD - 0.001,
        )));
        let decision = policy.decide("hello", &pair(None, None), None, None).await.unwrap();
        assert_eq!(decision.chosen_tier, Tier::Weak);
    }

    #[tokio::test]
    async fn semantic_dependency_failure_falls_through_to_difficulty() {
        use crate::embeddings::{EmbeddingClient, EmbeddingVector};
        use crate::semantic::SemanticRouteSpec;

        // Succeeds while embedding a route's utterances at build time, but
        // fails the single-text embed a query classification performs —
        // simulating an embedding backend that goes down between building
        // the classifier and serving a request.
        struct FlakyOnQueryEmbeddingClient;
        #[async_trait]
        impl EmbeddingClient for FlakyOnQueryEmbeddingClient {
            async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, AppError> {
                if texts.len() == 1 && texts[0] == "down-for-maintenance" {
                    return Err(AppError::ExternalDependency("embedding backend unreachable".into()));
                }
                Ok(texts.iter().map(|_| EmbeddingVector(vec![1.0])).collect())
            }
        }

        let specs = vec![SemanticRouteSpec {
            name: "greeting".into(),
            tier: Tier::Weak,
            utterances: vec!["hello".into(), "howdy".into()],
        }];
        let classifier = SemanticClassifier::build(Arc::new(FlakyOnQueryEmbeddingClient), &specs)
            .await
            .unwrap();

        let policy = RoutingPolicy::new(Arc::new(FixedScorerForDependencyTest(0.9)));
        let decision = policy
            .decide(
                "down-for-maintenance",
                &pair(None, None),
                None,
                Some(&classifier),
            )
            .await
            .unwrap();

        assert_eq!(decision.chosen_tier, Tier::Strong);
        assert_eq!(decision.basis, Basis::Difficulty);
        assert!(decision.predicted_semantic.is_none());
    }

    struct FixedScorerForDependencyTest(f64);
    #[async_trait]
    impl DifficultyScorer for FixedScorerForDependencyTest {
        async fn score(&self, _query: &str) -> Result<f64, AppError> {
            Ok(self.0)
        }
    }
}
