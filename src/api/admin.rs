//! Admin API (port 8081) — operator-facing introspection endpoints.
//!
//! These endpoints are separated onto a different port so they can be
//! network-restricted independently of the client API (e.g. accessible only
//! from the internal Docker network, never exposed to the internet).
//!
//! There is no static backend/tier registry to introspect here — every
//! request supplies its own model pair. What remains static,
//! and so is worth exposing, is the ambient gateway config and the two
//! process-wide sidecars the Routing Policy is built from: the embedding
//! backend (semantic routing + RAG) and the difficulty-scorer backend.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::router::RouterState;

/// Build the admin-facing axum router (port 8081).
pub fn router(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/admin/health", get(health))
        .route("/admin/traffic", get(traffic))
        .route("/admin/config", get(config))
        .route("/admin/backends/health", get(backends_health))
        .with_state(state)
}

/// GET /admin/health — liveness plus a summary of what's configured.
pub async fn health(State(state): State<Arc<RouterState>>) -> impl IntoResponse {
    let cfg = state.config();
    Json(json!({
        "status": "ok",
        "clients_configured": cfg.clients.len(),
        "difficulty_scorer": if cfg.difficulty_scorer.is_some() { "sidecar" } else { "heuristic" },
    }))
}

#[derive(Deserialize)]
pub struct TrafficQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}
fn default_limit() -> usize {
    100
}

/// GET /admin/traffic?limit=N — recent N traffic entries (default 100) plus
/// aggregate stats (error rate, fallback rate, per-tier split).
pub async fn traffic(
    State(state): State<Arc<RouterState>>,
    Query(q): Query<TrafficQuery>,
) -> impl IntoResponse {
    let entries = state.traffic.recent(q.limit).await;
    let stats = state.traffic.stats().await;
    Json(json!({
        "stats": stats,
        "entries": entries,
    }))
}

/// GET /admin/config — returns the current live config with secrets redacted
/// (env var names are shown, resolved values never are).
pub async fn config(State(state): State<Arc<RouterState>>) -> impl IntoResponse {
    let cfg = state.config();

    let clients: Vec<serde_json::Value> = cfg
        .clients
        .iter()
        .map(|c| {
            json!({
                "key_env": c.key_env,
                "has_default_models": c.default_models.is_some(),
                "has_default_semantics": c.default_semantics.is_some(),
            })
        })
        .collect();

    Json(json!({
        "gateway": {
            "client_port": cfg.gateway.client_port,
            "admin_port": cfg.gateway.admin_port,
            "traffic_log_capacity": cfg.gateway.traffic_log_capacity,
            "rate_limit_rpm": cfg.gateway.rate_limit_rpm,
            "request_deadline_ms": cfg.gateway.request_deadline_ms,
        },
        "embedding": {
            "base_url": cfg.embedding.base_url,
            "api_key_env": cfg.embedding.api_key_env,
            "model": cfg.embedding.model,
        },
        "difficulty_scorer": cfg.difficulty_scorer.as_ref().map(|d| json!({ "base_url": d.base_url })),
        "clients": clients,
    }))
}

/// GET /admin/backends/health — probe the embedding backend's reachability.
/// The difficulty scorer has no standard health endpoint to probe generically
/// (the heuristic scorer needs none; an HTTP sidecar's liveness is the
/// operator's concern via their own health check), so only embedding is probed here.
pub async fn backends_health(State(state): State<Arc<RouterState>>) -> impl IntoResponse {
    let embedding_ok = state
        .driver
        .embedding_client()
        .embed_batch(&["ping".to_string()])
        .await
        .is_ok();

    let status = if embedding_ok {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };

    (
        status,
        Json(json!({
            "embedding": if embedding_ok { "ok" } else { "unreachable" },
        })),
    )
}
