//! Model Descriptor, Model Pair and Tier — the value objects identifying
//! candidate backends for a single request.
//!
//! There is no global registry: a [`ModelPair`] is supplied in full on every
//! request and is immutable once constructed.

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

pub use crate::config::Provider;

/// Identifies a single backend as the caller wants it invoked.
///
/// `name` is the opaque model identifier the backend expects. `provider`
/// disambiguates the wire adapter when the name alone is ambiguous; absent
/// means the default OpenAI-compatible adapter. `base_url`/`api_key` override
/// the gateway's defaults for this one call; absent falls back to the
/// implementation-default environment credential (`OPENAI_API_KEY`).
/// `simulated_throughput` is a tokens-per-second estimate consulted only by
/// the `latency` optimization branch.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub provider: Option<Provider>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub simulated_throughput: Option<f64>,
}

/// The wire shape: `{"model": "<provider>/<name>" | "<name>", "api_key": "...",
/// "api_base": "...", "simulated_throughput": ...}`. Deserialized through this
/// intermediate so the public [`ModelDescriptor`] keeps its own field names
/// regardless of the wire schema's naming.
#[derive(Deserialize)]
struct WireModelDescriptor {
    model: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_base: Option<String>,
    #[serde(default)]
    simulated_throughput: Option<f64>,
}

/// Splits a wire model id on its first `/` and resolves the prefix against
/// the known provider tags; an unrecognized or absent prefix leaves the
/// whole string as `name` with `provider = None` (the default
/// OpenAI-compatible adapter).
fn split_provider_prefix(model: &str) -> (Option<Provider>, String) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let provider = match prefix {
            "openai" => Some(Provider::OpenAI),
            "openrouter" => Some(Provider::OpenRouter),
            "ollama" => Some(Provider::Ollama),
            "anthropic" => Some(Provider::Anthropic),
            _ => None,
        };
        if provider.is_some() {
            return (provider, rest.to_string());
        }
    }
    (None, model.to_string())
}

impl<'de> Deserialize<'de> for ModelDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = WireModelDescriptor::deserialize(deserializer)?;
        if wire.model.is_empty() {
            return Err(D::Error::custom("model descriptor `model` must not be empty"));
        }
        let (provider, name) = split_provider_prefix(&wire.model);
        Ok(ModelDescriptor {
            name,
            provider,
            base_url: wire.api_base,
            api_key: wire.api_key,
            simulated_throughput: wire.simulated_throughput,
        })
    }
}

impl ModelDescriptor {
    /// The wire-level model identifier sent to the backend: `<provider>/<name>`
    /// when a provider prefix is set, else `<name>` unchanged.
    pub fn wire_model_id(&self) -> String {
        match &self.provider {
            Some(p) => format!("{p}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Identity used for the `strong != weak` invariant — provider + name,
    /// since the same model name under different providers is a different
    /// backend.
    fn identity(&self) -> (Option<Provider>, &str) {
        (self.provider, self.name.as_str())
    }
}

/// Which descriptor of a [`ModelPair`] the Routing Policy chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Strong,
    Weak,
}

impl Tier {
    /// The other tier of the same pair — used by availability fallback.
    pub fn opposite(self) -> Self {
        match self {
            Self::Strong => Self::Weak,
            Self::Weak => Self::Strong,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Strong => "strong",
            Self::Weak => "weak",
        })
    }
}

/// Exactly two candidate backends for one request, keyed `strong`/`weak`.
///
/// There is no global model registry: every request supplies its own pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelPair {
    pub strong: ModelDescriptor,
    pub weak: ModelDescriptor,
}

impl ModelPair {
    /// Fetch the descriptor for `tier`.
    pub fn get(&self, tier: Tier) -> &ModelDescriptor {
        match tier {
            Tier::Strong => &self.strong,
            Tier::Weak => &self.weak,
        }
    }

    /// `strong != weak` by identity (provider + name); `Err` carries the
    /// shared identifier for use in a validation message.
    pub fn validate(&self) -> Result<(), String> {
        if self.strong.identity() == self.weak.identity() {
            return Err(self.strong.wire_model_id());
        }
        Ok(())
    }
}
