//! Client-facing API (port 8080) — the OpenAI-compatible endpoint callers talk to.
//!
//! This is intentionally a thin layer: all routing logic lives in
//! [`crate::router`]. Handlers translate HTTP concerns (status codes, JSON
//! bodies, extracting the authenticated client's standing defaults) into
//! calls to the router and back.

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::Value;

use crate::{
    api::{client_auth::ClientIdentity, status},
    router::{self, ChatCompletionRequest, RouterState},
};

/// Build the client-facing axum router (port 8080).
pub fn router(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/healthz", get(crate::api::health::healthz))
        .route("/status", get(status::status))
        .route("/metrics", get(crate::api::metrics::metrics))
        .route("/v1/models", get(crate::api::models::models))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state.clone())
        .merge(crate::api::chats::router(state))
}

/// POST /v1/chat/completions — deserialize, route, invoke the chosen backend,
/// and return the upstream response augmented with `routing_decision`.
pub async fn chat_completions(
    State(state): State<Arc<RouterState>>,
    identity: Option<Extension<ClientIdentity>>,
    Json(body): Json<ChatCompletionRequest>,
) -> impl IntoResponse {
    let (client, cache_key) = match &identity {
        Some(Extension(id)) => (Some(id.context.as_ref()), Some(id.key.as_str())),
        None => (None, None),
    };

    match router::handle_chat_completion(&state, body, client, cache_key).await {
        Ok((mut response, entry)) => {
            attach_routing_fields(&mut response, &entry);
            (axum::http::StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Attach the full `routing_decision` record (not just `basis`) plus a
/// `metadata` blob identifying the model actually called.
fn attach_routing_fields(response: &mut Value, entry: &crate::traffic::TrafficEntry) {
    let Some(obj) = response.as_object_mut() else {
        return;
    };

    obj.insert(
        "routing_decision".into(),
        serde_json::json!({
            "query": entry.query,
            "chosen_tier": entry.chosen_tier,
            "chosen_model_name": entry.chosen_model,
            "predicted_semantic": entry.predicted_semantic,
            "optimization_target": entry.optimization_target,
            "basis": entry.basis,
        }),
    );

    let hidden_params: Value = obj
        .get("metadata")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    obj.insert(
        "metadata".into(),
        serde_json::json!({
            "model_called": entry.chosen_model,
            "fell_back": entry.fell_back,
            "hidden_params": hidden_params,
        }),
    );
}
