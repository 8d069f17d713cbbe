//! Public status endpoint (`GET /status`, client port).
//!
//! Safe to expose publicly without authentication.
//! Returns gateway liveness and aggregate metrics only.
//!
//! What this endpoint **does not** include:
//! - Model names or base URLs from any request's model pair
//! - Semantic route names
//! - Per-client configuration
//!
//! This endpoint is enabled by default and intended to be the one public
//! window into the gateway's health. A future admin dashboard requiring
//! HTTPS will offer deeper introspection.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::router::RouterState;

/// `GET /status` — public liveness and metrics endpoint.
///
/// Example response:
/// ```json
/// {
///   "status": "ok",
///   "ready": true,
///   "uptime_secs": 3600,
///   "requests": {
///     "total": 1024,
///     "errors": 3,
///     "error_rate": 0.003,
///     "fallbacks": 2,
///     "avg_latency_ms": 87.4
///   }
/// }
/// ```
///
/// `ready` is `false` when the embedding backend has `api_key_env` configured
/// but the environment variable is not set or is empty — the semantic
/// classifier and RAG retrieval cannot function without it. No backend names
/// are exposed, only the boolean. When `ready: false` a `setup_url` field is
/// included pointing to the setup documentation.
pub async fn status(State(state): State<Arc<RouterState>>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();
    let stats = state.traffic.stats().await;
    let error_rate = if stats.total_requests == 0 {
        0.0_f64
    } else {
        stats.error_count as f64 / stats.total_requests as f64
    };

    let cfg = state.config();
    let ready = cfg
        .embedding
        .api_key_env
        .as_ref()
        .map(|_| cfg.embedding.api_key().map(|k| !k.is_empty()).unwrap_or(false))
        .unwrap_or(true);

    let mut body = json!({
        "status": "ok",
        "ready": ready,
        "uptime_secs": uptime_secs,
        "requests": {
            "total": stats.total_requests,
            "errors": stats.error_count,
            "error_rate": error_rate,
            "fallbacks": stats.fallback_count,
            "avg_latency_ms": stats.avg_latency_ms,
        }
    });

    if !ready {
        body["setup_url"] = serde_json::Value::String(
            "https://github.com/example/semantic-route-gateway/blob/main/docs/setup.md"
                .to_string(),
        );
    }

    Json(body)
}
