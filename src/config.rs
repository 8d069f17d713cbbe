//! Configuration types for the gateway.
//!
//! Config is loaded once at startup from a TOML file and validated before the
//! server opens any ports. Invalid configs are rejected with a clear error
//! rather than silently falling back to defaults.
//!
//! There is no static model registry here: every request supplies its own
//! [`crate::models::ModelPair`]. This file covers only ambient gateway
//! settings — ports, rate limiting, admin auth, retries — plus the embedding
//! and difficulty-scorer backends the Routing Policy is built from.
//!
//! # Example
//! ```toml
//! [gateway]
//! client_port = 8080
//!
//! [embedding]
//! base_url = "https://api.openai.com"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [[clients]]
//! key_env = "CLIENT_ACME_KEY"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Which API protocol a backend speaks.
///
/// The gateway normalizes all traffic to OpenAI's chat-completions schema;
/// each [`Provider`] variant maps to an adapter that handles any necessary
/// request/response translation at the edge.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Standard OpenAI `/v1/chat/completions` protocol.
    /// Also used by LM Studio, vLLM, LocalAI, and many others.
    #[default]
    OpenAI,
    /// OpenRouter — OpenAI-compatible wire format.
    OpenRouter,
    /// Ollama local inference server.
    Ollama,
    /// Anthropic Messages API (`/v1/messages`).
    /// Request and response shapes are translated to/from the OpenAI schema.
    Anthropic,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::OpenAI => "openai",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
            Self::Anthropic => "anthropic",
        })
    }
}

/// A per-client API key binding.
///
/// The gateway reads the actual key value from the environment variable
/// named by `key_env` at startup. This keeps secrets out of the config file.
/// `default_models`/`default_semantics` let a client omit those fields on
/// every request and fall back to a standing configuration instead.
///
/// ```toml
/// [[clients]]
/// key_env = "CLIENT_ACME_KEY"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Name of the environment variable whose value is this client's Bearer token.
    pub key_env: String,

    /// Default model pair used when a request from this client omits `models`.
    #[serde(default)]
    pub default_models: Option<crate::models::ModelPair>,

    /// Default semantic routes used when a request from this client omits `semantics`.
    #[serde(default)]
    pub default_semantics: Option<Vec<crate::semantic::SemanticRouteSpec>>,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub gateway: GatewayConfig,

    /// The embedding backend used by semantic routing and RAG retrieval.
    pub embedding: EmbeddingConfig,

    /// The difficulty-scoring backend consulted when neither an explicit
    /// optimization target nor a semantic match applies. Omit to use the
    /// built-in heuristic scorer.
    #[serde(default)]
    pub difficulty_scorer: Option<DifficultyScorerConfig>,

    /// Per-client API key bindings.
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for client in &self.clients {
            if let Some(pair) = &client.default_models {
                pair.validate().map_err(|model| {
                    anyhow::anyhow!(
                        "[[clients]] entry with key_env `{}` has identical strong/weak model `{}`",
                        client.key_env,
                        model
                    )
                })?;
            }
        }
        Ok(())
    }
}

/// Core gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Port for the agent-facing client API (default: 8080).
    #[serde(default = "defaults::client_port")]
    pub client_port: u16,

    /// Port for the admin API (default: 8081).
    #[serde(default = "defaults::admin_port")]
    pub admin_port: u16,

    /// Number of recent requests to keep in the in-memory traffic log (default: 500).
    #[serde(default = "defaults::traffic_log_capacity")]
    pub traffic_log_capacity: usize,

    /// Log level override (also controlled by `RUST_LOG` env var).
    #[serde(default)]
    pub log_level: Option<String>,

    /// Maximum requests per minute per client IP on the client port.
    ///
    /// Leave unset (or set to 0) to disable rate limiting. The burst
    /// allowance equals half of this value, rounded up.
    #[serde(default)]
    pub rate_limit_rpm: Option<u32>,

    /// Environment variable whose value is the Bearer token required for all
    /// admin API requests. Leave unset to disable admin authentication.
    #[serde(default)]
    pub admin_token_env: Option<String>,

    /// Number of additional attempts after the first failure (default: 0).
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Initial delay between retry attempts in milliseconds (default: 200),
    /// doubling per attempt, capped at 2000 ms.
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,

    /// Deadline applied to each inbound request, in milliseconds. `None`
    /// means no deadline beyond each backend call's own timeout.
    #[serde(default)]
    pub request_deadline_ms: Option<u64>,
}

/// The embedding backend used for semantic routing and RAG retrieval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible `/v1/embeddings` endpoint.
    pub base_url: String,

    /// Environment variable name whose value is the API key. Leave unset for
    /// keyless local backends.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Embedding model name (default: `text-embedding-3-small`).
    #[serde(default)]
    pub model: Option<String>,

    /// Request timeout in milliseconds (default: 30 000).
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }
}

/// An external difficulty-scoring sidecar, used in place of the built-in
/// heuristic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DifficultyScorerConfig {
    pub base_url: String,

    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
}

mod defaults {
    pub fn client_port() -> u16 { 8080 }
    pub fn admin_port() -> u16 { 8081 }
    pub fn traffic_log_capacity() -> usize { 500 }
    pub fn timeout_ms() -> u64 { 30_000 }
}
