//! Semantic Classifier — matches a query against a caller-supplied set of
//! named routes, each defined by a handful of example utterances.
//!
//! Each route carries a [`Tier`] directly rather than a separate model-type
//! tag, and a query's match score is the top-k mean over its similarity to
//! each route's example-utterance embeddings.

use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;

use crate::{
    embeddings::{embed_many_concurrently, EmbeddingClient, EmbeddingVector},
    error::AppError,
    models::Tier,
};

/// How many of a route's utterance embeddings, ranked by similarity to the
/// query, are averaged into that route's match score.
pub const SEMANTIC_TOP_K: usize = 3;

/// A query must reach this cosine similarity against a route's top-k mean
/// before the route is considered matched at all.
pub const SEMANTIC_SIMILARITY_FLOOR: f64 = 0.5;

/// One named route as supplied on the wire: a handful of example utterances
/// and the tier that should answer queries resembling them.
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticRouteSpec {
    pub name: String,
    pub tier: Tier,
    pub utterances: Vec<String>,
}

struct BuiltRoute {
    name: String,
    utterance_embeddings: Vec<EmbeddingVector>,
}

/// A set of routes with their utterances already embedded, ready to classify
/// queries against. The gateway caches these per client keyed on a
/// fingerprint of the specs, since building one re-embeds every utterance.
pub struct SemanticClassifier {
    embedding_client: Arc<dyn EmbeddingClient>,
    routes: Vec<BuiltRoute>,
    tier_by_name: HashMap<String, Tier>,
}

impl SemanticClassifier {
    /// Embed every route's utterances up front. Fans the embedding calls out
    /// concurrently across all utterances in all routes, not sequentially
    /// per route.
    pub async fn build(
        embedding_client: Arc<dyn EmbeddingClient>,
        specs: &[SemanticRouteSpec],
    ) -> Result<Self, AppError> {
        let mut tier_by_name = HashMap::new();
        let mut seen_names = std::collections::HashSet::with_capacity(specs.len());
        let mut routes = Vec::with_capacity(specs.len());

        for spec in specs {
            if spec.utterances.is_empty() {
                return Err(AppError::Validation(format!(
                    "semantic route {:?} has no utterances",
                    spec.name
                )));
            }
            if !seen_names.insert(spec.name.clone()) {
                return Err(AppError::Validation(format!(
                    "duplicate semantic route name {:?}",
                    spec.name
                )));
            }
            tier_by_name.insert(spec.name.clone(), spec.tier);
            let utterance_embeddings =
                embed_many_concurrently(embedding_client.as_ref(), &spec.utterances).await?;
            routes.push(BuiltRoute {
                name: spec.name.clone(),
                utterance_embeddings,
            });
        }

        Ok(Self {
            embedding_client,
            routes,
            tier_by_name,
        })
    }

    /// The tier bound to `route_name`, if it's one of this classifier's
    /// routes.
    pub fn tier_for(&self, route_name: &str) -> Option<Tier> {
        self.tier_by_name.get(route_name).copied()
    }

    /// Embed `query` and return the name of the best-matching route, or
    /// `None` if no route clears [`SEMANTIC_SIMILARITY_FLOOR`]. Route
    /// iteration order never affects the result — each route's score is
    /// computed independently and the overall maximum is taken across all
    /// of them.
    pub async fn classify(&self, query: &str) -> Result<Option<String>, AppError> {
        let query_embedding = self.embedding_client.embed_one(query).await?;

        let mut best: Option<(String, f64)> = None;
        for route in &self.routes {
            let mut similarities: Vec<f64> = route
                .utterance_embeddings
                .iter()
                .map(|e| e.cosine_similarity(&query_embedding))
                .collect();
            similarities.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            similarities.truncate(SEMANTIC_TOP_K);
            let score = similarities.iter().sum::<f64>() / similarities.len() as f64;

            if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((route.name.clone(), score));
            }
        }

        Ok(best
            .filter(|(_, score)| *score >= SEMANTIC_SIMILARITY_FLOOR)
            .map(|(name, _)| name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct HashEmbeddingClient;

    /// Deterministic stub: embeds a string as a one-hot vector keyed by its
    /// first character, so similarity is exactly 1.0 for matching first
    /// characters and 0.0 otherwise — no network, fully reproducible.
    #[async_trait]
    impl EmbeddingClient for HashEmbeddingClient {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, AppError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 26];
                    if let Some(c) = t.chars().next() {
                        let idx = (c.to_ascii_lowercase() as u8).saturating_sub(b'a') as usize;
                        if idx < 26 {
                            v[idx] = 1.0;
                        }
                    }
                    EmbeddingVector(v)
                })
                .collect())
        }
    }

    fn greeting_route() -> SemanticRouteSpec {
        SemanticRouteSpec {
            name: "greeting".into(),
            tier: Tier::Weak,
            utterances: vec!["hello".into(), "howdy".into()],
        }
    }

    fn multilingual_route() -> SemanticRouteSpec {
        SemanticRouteSpec {
            name: "multilingual".into(),
            tier: Tier::Strong,
            utterances: vec!["bonjour".into()],
        }
    }

    #[tokio::test]
    async fn build_rejects_route_with_no_utterances() {
        let client: Arc<dyn EmbeddingClient> = Arc::new(HashEmbeddingClient);
        let specs = vec![SemanticRouteSpec {
            name: "empty".into(),
            tier: Tier::Weak,
            utterances: vec![],
        }];
        assert!(SemanticClassifier::build(client, &specs).await.is_err());
    }

    #[tokio::test]
    async fn build_rejects_duplicate_route_names() {
        let client: Arc<dyn EmbeddingClient> = Arc::new(HashEmbeddingClient);
        let specs = vec![
            SemanticRouteSpec {
                name: "greeting".into(),
                tier: Tier::Weak,
                utterances: vec!["hello".into()],
            },
            SemanticRouteSpec {
                name: "greeting".into(),
                tier: Tier::Strong,
                utterances: vec!["bonjour".into()],
            },
        ];
        let result = SemanticClassifier::build(client, &specs).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn tier_for_returns_bound_tier() {
        let client: Arc<dyn EmbeddingClient> = Arc::new(HashEmbeddingClient);
        let specs = vec![greeting_route()];
        let classifier = SemanticClassifier::build(client, &specs).await.unwrap();
        assert_eq!(classifier.tier_for("greeting"), Some(Tier::Weak));
        assert_eq!(classifier.tier_for("unknown"), None);
    }

    #[tokio::test]
    async fn classify_matches_the_closer_route() {
        let client: Arc<dyn EmbeddingClient> = Arc::new(HashEmbeddingClient);
        let specs = vec![greeting_route(), multilingual_route()];
        let classifier = SemanticClassifier::build(client, &specs).await.unwrap();

        assert_eq!(classifier.classify("hey").await.unwrap(), Some("greeting".into()));
        assert_eq!(
            classifier.classify("bienvenue").await.unwrap(),
            Some("multilingual".into())
        );
    }

    #[tokio::test]
    async fn classify_returns_none_below_similarity_floor() {
        let client: Arc<dyn EmbeddingClient> = Arc::new(HashEmbeddingClient);
        let specs = vec![greeting_route()];
        let classifier = SemanticClassifier::build(client, &specs).await.unwrap();

        assert_eq!(classifier.classify("zzz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn classify_is_independent_of_route_order() {
        let client: Arc<dyn EmbeddingClient> = Arc::new(HashEmbeddingClient);
        let forward = SemanticClassifier::build(
            client.clone(),
            &[greeting_route(), multilingual_route()],
        )
        .await
        .unwrap();
        let reversed = SemanticClassifier::build(
            client,
            &[multilingual_route(), greeting_route()],
        )
        .await
        .unwrap();

        assert_eq!(
            forward.classify("hey").await.unwrap(),
            reversed.classify("hey").await.unwrap()
        );
    }
}
