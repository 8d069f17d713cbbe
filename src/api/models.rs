//! `GET /v1/models` — lists the known provider adapters for client discovery.
//!
//! There are no static tiers or model registries to report on here: a model
//! pair is supplied fresh on every `/v1/chat/completions` call. This endpoint
//! only tells a caller which `provider` prefixes (`openai/`, `anthropic/`,
//! `ollama/`, `openrouter/`) the gateway understands.

use axum::{response::IntoResponse, Json};
use serde_json::json;

use crate::config::Provider;

const KNOWN_PROVIDERS: [Provider; 4] = [
    Provider::OpenAI,
    Provider::OpenRouter,
    Provider::Ollama,
    Provider::Anthropic,
];

/// `GET /v1/models` — mirrors the OpenAI `/v1/models` list shape, but the
/// `id` field is a provider tag rather than a model name (there is nothing
/// model-specific to list without a request in hand).
pub async fn models() -> impl IntoResponse {
    let data: Vec<_> = KNOWN_PROVIDERS
        .iter()
        .map(|p| json!({ "id": p.to_string(), "object": "provider" }))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn models_lists_all_known_providers() {
        let app = axum::Router::new().route("/v1/models", axum::routing::get(models));
        let req = Request::get("/v1/models").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let ids: Vec<&str> = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["openai", "openrouter", "ollama", "anthropic"]);
    }
}
