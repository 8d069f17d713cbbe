//! Embedding client — turns text into vectors for semantic routing and RAG
//! retrieval.
//!
//! Shares the `backends::openai` adapter's shape (buffered `reqwest` client,
//! bearer auth, configurable base URL and timeout) redirected at
//! `/v1/embeddings` instead of `/v1/chat/completions`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;

/// A dense embedding vector. Wrapped rather than a bare `Vec<f64>` so
/// `cosine_similarity` reads as a method on the domain type instead of a
/// free function callers have to remember to use correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector(pub Vec<f64>);

impl EmbeddingVector {
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> f64 {
        let dot: f64 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        let norm_a: f64 = self.0.iter().map(|v| v * v).sum::<f64>().sqrt();
        let norm_b: f64 = other.0.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    /// Element-wise mean of `vectors`. Used by the Semantic Classifier to
    /// collapse a route's per-utterance embeddings into one representative
    /// vector, and by top-k aggregation over the closest utterances.
    pub fn mean(vectors: &[EmbeddingVector]) -> Option<EmbeddingVector> {
        let first = vectors.first()?;
        let dim = first.0.len();
        let mut sum = vec![0.0; dim];
        for v in vectors {
            for (acc, x) in sum.iter_mut().zip(v.0.iter()) {
                *acc += x;
            }
        }
        let n = vectors.len() as f64;
        Some(EmbeddingVector(sum.into_iter().map(|x| x / n).collect()))
    }
}

/// Turns text into embedding vectors. Implementations are injected so tests
/// can substitute a deterministic stub instead of calling a real backend.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, AppError>;

    async fn embed_one(&self, text: &str) -> Result<EmbeddingVector, AppError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch.pop().ok_or_else(|| {
            AppError::ExternalDependency("embedding backend returned an empty batch".into())
        })
    }
}

/// Default production client: an OpenAI-compatible `POST /v1/embeddings`.
/// Ollama and most self-hosted embedding servers speak this same wire shape,
/// so a single adapter covers them — unlike chat completions there is no
/// per-provider schema translation to do.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

impl HttpEmbeddingClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f64>,
    index: usize,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalDependency(format!(
                "embedding backend returned {status}: {body}"
            )));
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalDependency(format!("invalid embedding response: {e}")))?;
        parsed.data.sort_by_key(|d| d.index);

        Ok(parsed
            .data
            .into_iter()
            .map(|d| EmbeddingVector(d.embedding))
            .collect())
    }
}

/// Embed each text in `texts` concurrently via `client.embed_one`, preserving
/// input order. Used where a batch endpoint isn't guaranteed to return
/// results in request order, or where callers already hold one string at a
/// time (route utterances gathered from several routes).
pub async fn embed_many_concurrently(
    client: &dyn EmbeddingClient,
    texts: &[String],
) -> Result<Vec<EmbeddingVector>, AppError> {
    let futures = texts.iter().map(|t| client.embed_one(t));
    join_all(futures).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let a = EmbeddingVector(vec![1.0, 2.0, 3.0]);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let a = EmbeddingVector(vec![1.0, 0.0]);
        let b = EmbeddingVector(vec![0.0, 1.0]);
        assert!(a.cosine_similarity(&b).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_handles_zero_vector_without_dividing_by_zero() {
        let a = EmbeddingVector(vec![0.0, 0.0]);
        let b = EmbeddingVector(vec![1.0, 1.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn mean_of_empty_slice_is_none() {
        assert!(EmbeddingVector::mean(&[]).is_none());
    }

    #[test]
    fn mean_averages_elementwise() {
        let vectors = vec![
            EmbeddingVector(vec![1.0, 1.0]),
            EmbeddingVector(vec![3.0, 5.0]),
        ];
        let mean = EmbeddingVector::mean(&vectors).unwrap();
        assert_eq!(mean.0, vec![2.0, 3.0]);
    }

    struct StubClient;

    #[async_trait]
    impl EmbeddingClient for StubClient {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, AppError> {
            Ok(texts
                .iter()
                .map(|t| EmbeddingVector(vec![t.len() as f64]))
                .collect())
        }
    }

    #[tokio::test]
    async fn embed_many_concurrently_preserves_order() {
        let client = StubClient;
        let texts = vec!["a".to_string(), "abc".to_string(), "ab".to_string()];
        let result = embed_many_concurrently(&client, &texts).await.unwrap();
        assert_eq!(result, vec![
            EmbeddingVector(vec![1.0]),
            EmbeddingVector(vec![3.0]),
            EmbeddingVector(vec![2.0]),
        ]);
    }
}
