//! Completion Driver — ties the Routing Policy to a backend call, with an
//! explicit availability-fallback retry.
//!
//! Availability fallback is an explicit two-state retry: on any non-success
//! from the chosen tier, the opposite tier is tried once, with a brand-new
//! [`RoutingDecision`] (never a mutation of the first) recording the switch.

use serde_json::Value;

use crate::{
    chat::Role,
    deadline::Deadline,
    decision::RoutingDecision,
    difficulty::DifficultyScorer,
    embeddings::EmbeddingClient,
    error::AppError,
    models::ModelPair,
    policy::{OptimizationTarget, RoutingPolicy},
    semantic::{SemanticClassifier, SemanticRouteSpec},
};

use std::sync::Arc;

/// Everything the driver needs besides the request itself: the injected
/// classifiers and an embedding client for building a semantic classifier or
/// retrieving RAG context.
pub struct CompletionDriver {
    policy: RoutingPolicy,
    embedding_client: Arc<dyn EmbeddingClient>,
}

impl CompletionDriver {
    pub fn new(embedding_client: Arc<dyn EmbeddingClient>, difficulty_scorer: Arc<dyn DifficultyScorer>) -> Self {
        Self {
            policy: RoutingPolicy::new(difficulty_scorer),
            embedding_client,
        }
    }

    /// Decide a tier, call the chosen backend, and on any non-success in
    /// availability mode retry once on the opposite tier. Returns the
    /// backend's JSON response together with the [`RoutingDecision`] that
    /// was ultimately used (the retry's decision when a fallback occurred).
    ///
    /// `deadline`, when set, bounds the entire operation — classification,
    /// the first call, and the fallback retry all share the same absolute
    /// cutoff; exceeding it surfaces as [`AppError::DeadlineExceeded`] and no
    /// traffic-log or chat-message write happens for that attempt.
    pub async fn complete(
        &self,
        mut messages: Value,
        query: &str,
        model_pair: &ModelPair,
        optimization_target: Option<OptimizationTarget>,
        semantic: Option<&SemanticClassifier>,
        deadline: Option<Deadline>,
    ) -> Result<(Value, RoutingDecision), AppError> {
        model_pair
            .validate()
            .map_err(|model| AppError::Validation(format!("strong and weak models are identical: {model}")))?;

        let decide = self.policy.decide(query, model_pair, optimization_target, semantic);
        let decision = match deadline {
            Some(d) => d.guard(decide).await??,
            None => decide.await?,
        };

        let call = Self::call_backend(&decision, model_pair, &mut messages);
        let first_attempt = match deadline {
            Some(d) => d.guard(call).await?,
            None => Ok(call.await)?,
        };

        match first_attempt {
            Ok(response) => Ok((response, decision)),
            Err(first_error) => {
                if optimization_target != Some(OptimizationTarget::Availability) {
                    return Err(AppError::Upstream(first_error.to_string()));
                }

                let retry_tier = decision.chosen_tier.opposite();
                let retry_model = model_pair.get(retry_tier);
                let retry_decision = decision.fallback(retry_tier, retry_model.name.clone());

                let retry_call = Self::call_backend(&retry_decision, model_pair, &mut messages);
                let second_attempt = match deadline {
                    Some(d) => d.guard(retry_call).await?,
                    None => Ok(retry_call.await)?,
                };

                match second_attempt {
                    Ok(response) => Ok((response, retry_decision)),
                    Err(second_error) => Err(AppError::Upstream(format!(
                        "both tiers failed: {first_error}; fallback: {second_error}"
                    ))),
                }
            }
        }
    }

    async fn call_backend(
        decision: &RoutingDecision,
        model_pair: &ModelPair,
        messages: &mut Value,
    ) -> anyhow::Result<Value> {
        let descriptor = model_pair.get(decision.chosen_tier);
        if let Some(obj) = messages.as_object_mut() {
            obj.insert("model".into(), Value::String(descriptor.wire_model_id()));
        }
        let client = crate::backends::BackendClient::new(descriptor)?;
        client.chat_completions(messages.clone()).await
    }

    /// Build a [`SemanticClassifier`] for this driver's embedding client from
    /// caller-supplied route specs, or `None` when no routes were supplied.
    pub async fn build_semantic_classifier(
        &self,
        specs: &[SemanticRouteSpec],
    ) -> Result<Option<SemanticClassifier>, AppError> {
        if specs.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            SemanticClassifier::build(self.embedding_client.clone(), specs).await?,
        ))
    }

    pub fn embedding_client(&self) -> &Arc<dyn EmbeddingClient> {
        &self.embedding_client
    }
}

/// Extract the assistant reply text from an OpenAI-shaped chat completion
/// response, for persisting into the Chat/Message store.
pub fn extract_reply_text(response: &Value) -> Option<(Role, String)> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| (Role::Assistant, s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decision::Basis,
        models::{ModelDescriptor, Tier},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedScorer(f64);
    #[async_trait]
    impl DifficultyScorer for FixedScorer {
        async fn score(&self, _query: &str) -> Result<f64, AppError> {
            Ok(self.0)
        }
    }

    struct StubEmbeddingClient;
    #[async_trait]
    impl EmbeddingClient for StubEmbeddingClient {
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<crate::embeddings::EmbeddingVector>, AppError> {
            Ok(texts
                .iter()
                .map(|_| crate::embeddings::EmbeddingVector(vec![1.0]))
                .collect())
        }
    }

    fn descriptor(name: &str, base_url: String) -> ModelDescriptor {
        ModelDescriptor {
            name: name.into(),
            provider: None,
            base_url: Some(base_url),
            api_key: None,
            simulated_throughput: None,
        }
    }

    fn ok_body() -> Value {
        json!({ "choices": [{ "message": { "content": "hello from backend" } }] })
    }

    #[tokio::test]
    async fn complete_rejects_identical_model_pair() {
        let driver = CompletionDriver::new(Arc::new(StubEmbeddingClient), Arc::new(FixedScorer(0.9)));
        let pair = ModelPair {
            strong: descriptor("same", "http://localhost".into()),
            weak: descriptor("same", "http://localhost".into()),
        };
        let result = driver
            .complete(json!({"messages": []}), "hi", &pair, None, None, None)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn complete_succeeds_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&server)
            .await;

        let driver = CompletionDriver::new(Arc::new(StubEmbeddingClient), Arc::new(FixedScorer(0.9)));
        let pair = ModelPair {
            strong: descriptor("strong-model", server.uri()),
            weak: descriptor("weak-model", server.uri()),
        };

        let (response, decision) = driver
            .complete(json!({"messages": []}), "hi", &pair, None, None, None)
            .await
            .unwrap();

        assert!(response.pointer("/choices/0/message/content").is_some());
        assert_eq!(decision.chosen_tier, Tier::Strong);
        assert_eq!(decision.basis, Basis::Difficulty);
    }

    #[tokio::test]
    async fn complete_without_availability_surfaces_upstream_error_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let driver = CompletionDriver::new(Arc::new(StubEmbeddingClient), Arc::new(FixedScorer(0.9)));
        let pair = ModelPair {
            strong: descriptor("strong-model", server.uri()),
            weak: descriptor("weak-model", server.uri()),
        };

        let result = driver
            .complete(json!({"messages": []}), "hi", &pair, None, None, None)
            .await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }

    #[tokio::test]
    async fn complete_falls_back_to_opposite_tier_in_availability_mode() {
        let failing_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&failing_server)
            .await;

        let working_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&working_server)
            .await;

        let driver = CompletionDriver::new(Arc::new(StubEmbeddingClient), Arc::new(FixedScorer(0.9)));
        let pair = ModelPair {
            strong: descriptor("strong-model", failing_server.uri()),
            weak: descriptor("weak-model", working_server.uri()),
        };

        let (response, decision) = driver
            .complete(
                json!({"messages": []}),
                "hi",
                &pair,
                Some(OptimizationTarget::Availability),
                None,
                None,
            )
            .await
            .unwrap();

        assert!(response.pointer("/choices/0/message/content").is_some());
        assert_eq!(decision.chosen_tier, Tier::Weak);
        assert_eq!(decision.basis, Basis::FallbackAvailability);
    }

    #[tokio::test]
    async fn complete_reports_both_failures_when_fallback_also_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let driver = CompletionDriver::new(Arc::new(StubEmbeddingClient), Arc::new(FixedScorer(0.9)));
        let pair = ModelPair {
            strong: descriptor("strong-model", server.uri()),
            weak: descriptor("weak-model", server.uri()),
        };

        let result = driver
            .complete(
                json!({"messages": []}),
                "hi",
                &pair,
                Some(OptimizationTarget::Availability),
                None,
                None,
            )
            .await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }

    #[test]
    fn extract_reply_text_pulls_assistant_content() {
        let response = ok_body();
        let (role, text) = extract_reply_text(&response).unwrap();
        assert_eq!(role, Role::Assistant);
        assert_eq!(text, "hello from backend");
    }
}
