//! Backend client factory and unified dispatch interface.
//!
//! [`BackendClient`] is an enum that wraps a concrete provider adapter chosen
//! at construction time from a [`ModelDescriptor`]'s `provider`. All routing
//! code interacts with the same API (`chat_completions`, `health_check`);
//! adapter-specific protocol differences are fully encapsulated in the
//! adapter modules.
//!
//! Adapters here are built from a per-request [`ModelDescriptor`] rather
//! than a static config-file tier — there is no backend registry, since a
//! request names its own base URL and credential (falling back to
//! provider-specific defaults and environment credentials when it doesn't).

mod anthropic;
mod ollama;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAIAdapter;

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde_json::Value;

use crate::{config::Provider, models::ModelDescriptor};

/// A `Send`-able, heap-allocated SSE byte stream.
pub type SseStream = Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Unified backend client — enum dispatch over concrete provider adapters.
pub enum BackendClient {
    /// OpenAI-compatible passthrough (also used for OpenRouter).
    OpenAI(OpenAIAdapter),
    /// Anthropic Messages API with request/response translation.
    Anthropic(AnthropicAdapter),
    /// Ollama local inference server (OpenAI-compat endpoint).
    Ollama(OllamaAdapter),
}

impl BackendClient {
    /// Build a backend client for `descriptor`, resolving a missing base URL
    /// to that provider's public default and a missing credential from the
    /// provider's conventional environment variable (`OPENAI_API_KEY`,
    /// `ANTHROPIC_API_KEY`); Ollama requires neither.
    pub fn new(descriptor: &ModelDescriptor) -> anyhow::Result<Self> {
        let provider = descriptor.provider.unwrap_or_default();

        Ok(match provider {
            Provider::OpenAI | Provider::OpenRouter => {
                let base_url = descriptor
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
                let api_key = descriptor
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok());
                Self::OpenAI(OpenAIAdapter::new(
                    base_url.trim_end_matches('/').to_string(),
                    DEFAULT_TIMEOUT_MS,
                    api_key,
                ))
            }
            Provider::Ollama => {
                let base_url = descriptor
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string());
                Self::Ollama(OllamaAdapter::new(
                    base_url.trim_end_matches('/').to_string(),
                    DEFAULT_TIMEOUT_MS,
                ))
            }
            Provider::Anthropic => {
                let base_url = descriptor
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string());
                let api_key = descriptor
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "Anthropic model {:?} requires an API key; set it on the request \
                             or the ANTHROPIC_API_KEY environment variable",
                            descriptor.name
                        )
                    })?;
                Self::Anthropic(AnthropicAdapter::new(
                    base_url.trim_end_matches('/').to_string(),
                    DEFAULT_TIMEOUT_MS,
                    api_key,
                ))
            }
        })
    }

    /// Forward a `/v1/chat/completions` request to the resolved backend.
    ///
    /// The request body should have `model` already rewritten by the caller
    /// to the descriptor's wire model id.
    pub async fn chat_completions(&self, request: Value) -> anyhow::Result<Value> {
        match self {
            Self::OpenAI(a) => a.chat_completions(request).await,
            Self::Anthropic(a) => a.chat_completions(request).await,
            Self::Ollama(a) => a.chat_completions(request).await,
        }
    }

    /// Forward a streaming request and return an [`SseStream`].
    pub async fn chat_completions_stream(&self, request: Value) -> anyhow::Result<SseStream> {
        match self {
            Self::OpenAI(a) => a.chat_completions_stream(request).await,
            Self::Ollama(a) => a.chat_completions_stream(request).await,
            Self::Anthropic(a) => a.chat_completions_stream(request).await,
        }
    }

    /// Probe this backend for liveness. Implementation varies by provider.
    pub async fn health_check(&self) -> anyhow::Result<()> {
        match self {
            Self::OpenAI(a) => a.health_check().await,
            Self::Anthropic(a) => a.health_check().await,
            Self::Ollama(a) => a.health_check().await,
        }
    }
}
