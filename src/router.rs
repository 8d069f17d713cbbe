//! Gateway glue — HTTP-facing request handling, independent of axum.
//!
//! [`RouterState`] holds everything a request handler needs: the hot-
//! reloadable [`Config`], the traffic log, the per-client key map, and the
//! [`CompletionDriver`] built from the configured embedding/difficulty
//! backends. [`handle_chat_completion`] is the `/v1/chat/completions`
//! request's entry point once the HTTP layer has parsed the body; it never
//! touches axum types, so it is tested directly against `wiremock` backends
//! without standing up a server.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    api::rate_limit::RateLimiter,
    chat::{ChatStore, Role},
    config::Config,
    deadline::Deadline,
    difficulty::{DifficultyScorer, HeuristicDifficultyScorer, HttpDifficultyScorer},
    driver::{self, CompletionDriver},
    embeddings::{EmbeddingClient, HttpEmbeddingClient},
    error::AppError,
    models::ModelPair,
    policy::OptimizationTarget,
    rag::VectorStore,
    semantic::{SemanticClassifier, SemanticRouteSpec},
    traffic::{TrafficEntry, TrafficLog},
};

/// Standing defaults bound to a `[[clients]]` entry, applied when a request
/// omits `models`/`semantics`.
#[derive(Clone)]
pub struct ClientContext {
    pub default_models: Option<ModelPair>,
    pub default_semantics: Option<Vec<SemanticRouteSpec>>,
}

/// Shared application state injected into every request handler.
pub struct RouterState {
    /// Atomically-swappable live config; the lock is held only for the
    /// duration of `Arc::clone`, so it never blocks request handling.
    config_lock: Arc<RwLock<Arc<Config>>>,
    /// Path to the config file on disk — used by the hot-reload background task.
    pub config_path: PathBuf,
    /// In-memory ring-buffer of recent requests, exposed through the admin API.
    pub traffic: Arc<TrafficLog>,
    /// Gateway start time — used to compute uptime for the public status endpoint.
    pub started_at: std::time::Instant,
    /// Optional per-IP rate limiter. `None` means rate limiting is disabled.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Bearer token required for admin API access. `None` disables admin auth.
    pub admin_token: Option<String>,
    /// Maps resolved client API key values to their standing defaults.
    /// Not updated on hot-reload; restart required to pick up new client keys.
    pub client_map: HashMap<String, Arc<ClientContext>>,
    /// Ties the routing policy to the configured embedding/difficulty backends.
    pub driver: CompletionDriver,
    /// Chat/message history for the `/v1/chats` endpoints.
    pub chats: ChatStore,
    /// Deadline applied to the whole request, from `gateway.request_deadline_ms`.
    pub request_deadline: Option<std::time::Duration>,
    /// Built semantic classifiers, keyed by the client identity plus a
    /// fingerprint of the route specs actually in use — a client's cached
    /// classifier is only reused when the request's `semantics` (or its
    /// standing `default_semantics`) hash to the same specs that built it.
    semantic_cache: DashMap<String, Arc<SemanticClassifier>>,
}

/// Hashes route names, tiers, and utterances into a cache-key fragment. Two
/// spec lists that aren't identical, including reordered ones, hash to
/// different values — a client switching `semantics` between requests must
/// not be served a classifier built from the previous request's routes.
fn specs_fingerprint(specs: &[SemanticRouteSpec]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for spec in specs {
        spec.name.hash(&mut hasher);
        spec.tier.hash(&mut hasher);
        spec.utterances.hash(&mut hasher);
    }
    hasher.finish()
}

impl RouterState {
    pub fn new(config: Arc<Config>, config_path: PathBuf, traffic: Arc<TrafficLog>) -> Self {
        let rate_limiter = config
            .gateway
            .rate_limit_rpm
            .filter(|&rpm| rpm > 0)
            .map(|rpm| Arc::new(RateLimiter::new(rpm)));
        let admin_token = config
            .gateway
            .admin_token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());

        let client_map: HashMap<String, Arc<ClientContext>> = config
            .clients
            .iter()
            .filter_map(|c| {
                let key = std::env::var(&c.key_env).ok().filter(|k| !k.is_empty())?;
                Some((
                    key,
                    Arc::new(ClientContext {
                        default_models: c.default_models.clone(),
                        default_semantics: c.default_semantics.clone(),
                    }),
                ))
            })
            .collect();
        if !client_map.is_empty() {
            tracing::info!(count = client_map.len(), "loaded client key mappings");
        }

        let mut embedding_client = HttpEmbeddingClient::new(
            config.embedding.base_url.clone(),
            config.embedding.api_key(),
            config.embedding.timeout_ms,
        )
        .expect("failed to build embedding HTTP client");
        if let Some(model) = &config.embedding.model {
            embedding_client = embedding_client.with_model(model.clone());
        }
        let embedding_client: Arc<dyn EmbeddingClient> = Arc::new(embedding_client);
        let difficulty_scorer: Arc<dyn DifficultyScorer> = match &config.difficulty_scorer {
            Some(cfg) => Arc::new(
                HttpDifficultyScorer::new(cfg.base_url.clone(), cfg.timeout_ms)
                    .expect("failed to build difficulty-scorer HTTP client"),
            ),
            None => Arc::new(HeuristicDifficultyScorer),
        };
        let driver = CompletionDriver::new(embedding_client, difficulty_scorer);

        let request_deadline = config
            .gateway
            .request_deadline_ms
            .map(std::time::Duration::from_millis);

        Self {
            config_lock: Arc::new(RwLock::new(config)),
            config_path,
            traffic,
            started_at: std::time::Instant::now(),
            rate_limiter,
            admin_token,
            client_map,
            driver,
            chats: ChatStore::new(),
            request_deadline,
            semantic_cache: DashMap::new(),
        }
    }

    /// Returns a snapshot of the current live config.
    pub fn config(&self) -> Arc<Config> {
        self.config_lock.read().expect("config lock poisoned").clone()
    }

    /// Atomically replaces the live config. Called only from the hot-reload task.
    pub fn replace_config(&self, new: Arc<Config>) {
        *self.config_lock.write().expect("config lock poisoned") = new;
    }

    /// Build (or fetch from cache) a [`SemanticClassifier`] for `specs`,
    /// keyed by `cache_key` plus a fingerprint of `specs` itself. Requests
    /// with no stable client identity (no `[[clients]]` match) pass `None`
    /// and always rebuild.
    async fn classifier_for(
        &self,
        cache_key: Option<&str>,
        specs: &[SemanticRouteSpec],
    ) -> Result<Option<Arc<SemanticClassifier>>, AppError> {
        if specs.is_empty() {
            return Ok(None);
        }
        let full_key = cache_key.map(|key| format!("{key}:{:x}", specs_fingerprint(specs)));
        if let Some(key) = &full_key {
            if let Some(existing) = self.semantic_cache.get(key) {
                return Ok(Some(existing.clone()));
            }
        }
        let built = self
            .driver
            .build_semantic_classifier(specs)
            .await?
            .expect("non-empty specs always build a classifier");
        let built = Arc::new(built);
        if let Some(key) = full_key {
            self.semantic_cache.insert(key, built.clone());
        }
        Ok(Some(built))
    }
}

/// The parsed `POST /v1/chat/completions` body.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Value,
    #[serde(default)]
    pub models: Option<ModelPair>,
    #[serde(default)]
    pub optimization_metric: Option<OptimizationTarget>,
    #[serde(default)]
    pub semantics: Option<Vec<SemanticRouteSpec>>,
    #[serde(default)]
    pub chat_id: Option<u64>,
}

/// Pull the most recent user turn out of an OpenAI-shaped `messages` array —
/// this is the text classifiers and the difficulty scorer act on.
fn extract_query(messages: &Value) -> Result<String, AppError> {
    let array = messages
        .as_array()
        .ok_or_else(|| AppError::Validation("messages must be a JSON array".into()))?;

    array
        .iter()
        .rev()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("messages must contain at least one user turn".into()))
}

/// Route a `/v1/chat/completions` request: resolve the model pair and
/// semantic routes (falling back to the authenticated client's standing
/// defaults), classify, call the backend, persist into the chat if one was
/// named, and record a [`TrafficEntry`].
pub async fn handle_chat_completion(
    state: &RouterState,
    request: ChatCompletionRequest,
    client: Option<&ClientContext>,
    client_cache_key: Option<&str>,
) -> Result<(Value, TrafficEntry), AppError> {
    let model_pair = request
        .models
        .or_else(|| client.and_then(|c| c.default_models.clone()))
        .ok_or_else(|| AppError::Validation("no `models` in request and no client default configured".into()))?;

    let semantic_specs = request
        .semantics
        .or_else(|| client.and_then(|c| c.default_semantics.clone()))
        .unwrap_or_default();

    let query = extract_query(&request.messages)?;
    let classifier = state.classifier_for(client_cache_key, &semantic_specs).await?;

    let mut messages = request.messages;
    if let Some(chat_id) = request.chat_id {
        if !state.chats.exists(chat_id).await {
            return Err(AppError::Validation(format!("unknown chat id {chat_id}")));
        }
        if let Some(context) = rag_context_for(state, chat_id, &query).await? {
            prepend_system_message(&mut messages, &context);
        }
    }

    let deadline = state.request_deadline.map(Deadline::after);

    let t0 = std::time::Instant::now();
    let result = state
        .driver
        .complete(
            messages,
            &query,
            &model_pair,
            request.optimization_metric,
            classifier.as_deref(),
            deadline,
        )
        .await;
    let latency_ms = t0.elapsed().as_millis() as u64;

    match result {
        Ok((response, decision)) => {
            if let Some(chat_id) = request.chat_id {
                if let Some((role, text)) = driver::extract_reply_text(&response) {
                    state
                        .chats
                        .add_message(
                            chat_id,
                            role,
                            text,
                            Some(decision.chosen_model_name.clone()),
                            decision.predicted_semantic.clone(),
                        )
                        .await?;
                }
            }

            let fell_back = decision.basis == crate::decision::Basis::FallbackAvailability;
            let mut entry = TrafficEntry::from_decision(&decision, latency_ms, true);
            if fell_back {
                entry = entry.mark_fell_back();
            }
            state.traffic.push(entry.clone());
            Ok((response, entry))
        }
        Err(err) => {
            warn!(error = %err, "chat completion failed");
            state
                .traffic
                .push(TrafficEntry::failed(query, latency_ms).with_error(&err.to_string()));
            Err(err)
        }
    }
}

async fn rag_context_for(
    state: &RouterState,
    chat_id: u64,
    query: &str,
) -> Result<Option<String>, AppError> {
    let chunks = state
        .chats
        .search_knowledge_base(chat_id, state.driver.embedding_client().as_ref(), query)
        .await?;
    Ok(crate::rag::build_context_block(&chunks))
}

/// Attach a knowledge base to a chat by chunking and embedding `text`.
pub async fn attach_knowledge_base(
    state: &RouterState,
    chat_id: u64,
    text: &str,
) -> Result<(), AppError> {
    let store = VectorStore::build(state.driver.embedding_client().as_ref(), text).await?;
    state.chats.attach_knowledge_base(chat_id, store).await
}

fn prepend_system_message(messages: &mut Value, context: &str) {
    if let Some(array) = messages.as_array_mut() {
        array.insert(
            0,
            serde_json::json!({ "role": Role::System, "content": context }),
        );
    }
}
