//! Chat lifecycle endpoints (`POST /v1/chats`, `GET /v1/chats`,
//! `GET /v1/chats/{id}`) — the ambient collaborator surface around the
//! `/v1/chat/completions` core. A chat is just an addressable place to
//! accumulate message history and, optionally, an attached knowledge base
//! for retrieval-augmented context.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, router, router::RouterState};

pub fn router(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/v1/chats", post(create_chat).get(list_chats))
        .route("/v1/chats/{id}", get(get_chat))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    /// Free text to chunk, embed, and attach as a retrieval-augmented
    /// knowledge base. Omitted or empty means the chat starts with none.
    #[serde(default)]
    pub knowledgebase: Option<String>,
}

/// `POST /v1/chats` — create a chat, optionally attaching a knowledge base.
async fn create_chat(
    State(state): State<Arc<RouterState>>,
    Json(body): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let chat_id = state.chats.create().await;
    if let Some(text) = body.knowledgebase.filter(|t| !t.trim().is_empty()) {
        router::attach_knowledge_base(&state, chat_id, &text).await?;
    }
    Ok((axum::http::StatusCode::CREATED, Json(json!({ "chat_id": chat_id }))))
}

/// `GET /v1/chats` — list known chats, most recent activity not tracked,
/// ordered by id.
async fn list_chats(State(state): State<Arc<RouterState>>) -> impl IntoResponse {
    Json(json!({ "chats": state.chats.list().await }))
}

/// `GET /v1/chats/{id}` — fetch a chat's full message history.
async fn get_chat(
    State(state): State<Arc<RouterState>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let messages = state.chats.recent_messages(id, None).await?;
    Ok(Json(json!({ "chat_id": id, "messages": messages })))
}
