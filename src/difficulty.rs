//! Difficulty Classifier — the last-resort tier choice when neither an
//! explicit optimization target nor a semantic route applies.
//!
//! Modeled on RouteLLM's matrix-factorization ("mf") router: scores a
//! query's difficulty and compares it against a calibrated threshold,
//! routing to the strong model at or above it. That threshold is carried
//! over unchanged as [`DIFFICULTY_THRESHOLD`]. The scorer is injected as a
//! trait so a sidecar implementation of the real matrix-factorization model
//! can be swapped in without touching the routing policy.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AppError;

/// RouteLLM's calibrated "mf" router threshold — queries scoring at or above
/// this are routed to the strong model (inclusive comparison).
pub const DIFFICULTY_THRESHOLD: f64 = 0.11593;

/// Scores a query's difficulty on a `0.0..=1.0` scale. Implementations are
/// injected so tests can substitute a fixed score instead of running (or
/// faking) a real difficulty model.
#[async_trait]
pub trait DifficultyScorer: Send + Sync {
    async fn score(&self, query: &str) -> Result<f64, AppError>;
}

/// Stand-in for the absent matrix-factorization router. This is a heuristic,
/// not a faithful reproduction of RouteLLM's learned model — it exists so
/// the gateway has a working default scorer without a trained model or
/// external service, and is intentionally documented as such rather than
/// presented as equivalent to the original `"mf"` router.
///
/// Scores by combining token count, average word length, and the presence of
/// multi-clause or code-like structure — signals that correlate with
/// "harder" queries without claiming to replicate a learned classifier.
pub struct HeuristicDifficultyScorer;

impl HeuristicDifficultyScorer {
    fn heuristic_score(query: &str) -> f64 {
        let tokens: Vec<&str> = query.split_whitespace().collect();
        let token_count = tokens.len().max(1);

        let avg_word_len = tokens.iter().map(|t| t.len()).sum::<usize>() as f64 / token_count as f64;

        let clause_markers = query
            .matches(|c: char| matches!(c, ',' | ';' | ':'))
            .count();
        let question_marks = query.matches('?').count();
        let code_like = query
            .matches(|c: char| matches!(c, '{' | '}' | '(' | ')' | ';' | '='))
            .count();

        let length_component = (token_count as f64 / 40.0).min(1.0);
        let vocabulary_component = ((avg_word_len - 3.0) / 7.0).clamp(0.0, 1.0);
        let structure_component = ((clause_markers + question_marks + code_like) as f64 / 6.0).min(1.0);

        (0.5 * length_component + 0.3 * vocabulary_component + 0.2 * structure_component).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl DifficultyScorer for HeuristicDifficultyScorer {
    async fn score(&self, query: &str) -> Result<f64, AppError> {
        Ok(Self::heuristic_score(query))
    }
}

/// Production escape hatch: delegates to a sidecar difficulty-scoring
/// service over HTTP, for deployments that run a real trained model instead
/// of the built-in heuristic.
pub struct HttpDifficultyScorer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDifficultyScorer {
    pub fn new(base_url: String, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[derive(serde::Deserialize)]
struct ScoreResponse {
    score: f64,
}

#[async_trait]
impl DifficultyScorer for HttpDifficultyScorer {
    async fn score(&self, query: &str) -> Result<f64, AppError> {
        let url = format!("{}/score", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalDependency(format!(
                "difficulty scorer returned {status}"
            )));
        }
        let parsed: ScoreResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalDependency(format!("invalid difficulty response: {e}")))?;
        Ok(parsed.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_greeting_scores_low() {
        let scorer = HeuristicDifficultyScorer;
        let score = scorer.score("hi").await.unwrap();
        assert!(score < DIFFICULTY_THRESHOLD, "expected {score} < threshold");
    }

    #[tokio::test]
    async fn long_multi_clause_query_scores_higher_than_a_greeting() {
        let scorer = HeuristicDifficultyScorer;
        let greeting_score = scorer.score("hi").await.unwrap();
        let hard_score = scorer
            .score(
                "Given the following constraints: latency, cost, and availability; \
                 design a routing algorithm that balances them, and explain your \
                 reasoning in detail?",
            )
            .await
            .unwrap();
        assert!(hard_score > greeting_score);
    }

    #[tokio::test]
    async fn score_is_always_within_unit_interval() {
        let scorer = HeuristicDifficultyScorer;
        for query in ["", "a", &"word ".repeat(200), "{}();=,;:???"] {
            let score = scorer.score(query).await.unwrap();
            assert!((0.0..=1.0).contains(&score), "{query:?} scored {score}");
        }
    }
}
