//! Chat/Message store.
//!
//! Tracks conversation history per chat id: `add_message(content, role,
//! model_used, predicted_semantic, metadata)` and `get_messages(k_recent)`.
//! There is no database in scope here, so the store is an in-memory
//! `RwLock<HashMap<u64, Chat>>` with no eviction — chats live for the
//! lifetime of the process, matching the gateway's posture toward the
//! traffic log (bounded only by operator-visible memory, not by design).

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{error::AppError, rag::VectorStore};

/// A chat participant's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in a chat.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub model_used: Option<String>,
    pub predicted_semantic: Option<String>,
}

/// A lightweight summary of a chat, without its message history.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub has_knowledge_base: bool,
}

/// A chat session: its message history and, optionally, an attached
/// knowledge base for retrieval-augmented responses.
pub struct Chat {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    messages: Vec<Message>,
    next_message_id: AtomicU64,
    pub knowledge_base: Option<VectorStore>,
}

impl Chat {
    fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            messages: Vec::new(),
            next_message_id: AtomicU64::new(1),
            knowledge_base: None,
        }
    }

    /// Append a message and return it.
    pub fn add_message(
        &mut self,
        role: Role,
        content: String,
        model_used: Option<String>,
        predicted_semantic: Option<String>,
    ) -> &Message {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        self.messages.push(Message {
            id,
            role,
            content,
            sent_at: Utc::now(),
            model_used,
            predicted_semantic,
        });
        self.messages.last().expect("just pushed")
    }

    /// Return the last `k_recent` messages, or all of them when `None`.
    pub fn get_messages(&self, k_recent: Option<usize>) -> &[Message] {
        match k_recent {
            Some(k) => {
                let start = self.messages.len().saturating_sub(k);
                &self.messages[start..]
            }
            None => &self.messages,
        }
    }
}

/// In-memory registry of all chats known to this gateway instance.
pub struct ChatStore {
    chats: RwLock<HashMap<u64, Chat>>,
    next_chat_id: AtomicU64,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        Self {
            chats: RwLock::new(HashMap::new()),
            next_chat_id: AtomicU64::new(1),
        }
    }

    /// Create a new chat and return its id.
    pub async fn create(&self) -> u64 {
        let id = self.next_chat_id.fetch_add(1, Ordering::Relaxed);
        self.chats.write().await.insert(id, Chat::new(id));
        id
    }

    /// Attach a knowledge base to an existing chat.
    pub async fn attach_knowledge_base(
        &self,
        chat_id: u64,
        store: VectorStore,
    ) -> Result<(), AppError> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .get_mut(&chat_id)
            .ok_or_else(|| AppError::Validation(format!("unknown chat id {chat_id}")))?;
        chat.knowledge_base = Some(store);
        Ok(())
    }

    /// Append a message to an existing chat.
    pub async fn add_message(
        &self,
        chat_id: u64,
        role: Role,
        content: String,
        model_used: Option<String>,
        predicted_semantic: Option<String>,
    ) -> Result<(), AppError> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .get_mut(&chat_id)
            .ok_or_else(|| AppError::Validation(format!("unknown chat id {chat_id}")))?;
        chat.add_message(role, content, model_used, predicted_semantic);
        Ok(())
    }

    /// Return the last `k_recent` messages for a chat.
    pub async fn recent_messages(
        &self,
        chat_id: u64,
        k_recent: Option<usize>,
    ) -> Result<Vec<Message>, AppError> {
        let chats = self.chats.read().await;
        let chat = chats
            .get(&chat_id)
            .ok_or_else(|| AppError::Validation(format!("unknown chat id {chat_id}")))?;
        Ok(chat.get_messages(k_recent).to_vec())
    }

    pub async fn exists(&self, chat_id: u64) -> bool {
        self.chats.read().await.contains_key(&chat_id)
    }

    /// Summaries of every known chat, ordered by id.
    pub async fn list(&self) -> Vec<ChatSummary> {
        let chats = self.chats.read().await;
        let mut summaries: Vec<ChatSummary> = chats
            .values()
            .map(|chat| ChatSummary {
                id: chat.id,
                created_at: chat.created_at,
                message_count: chat.messages.len(),
                has_knowledge_base: chat.knowledge_base.is_some(),
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }

    /// Search a chat's attached knowledge base, if any, for chunks relevant
    /// to `query`. Returns an empty vec when the chat has no knowledge base.
    pub async fn search_knowledge_base(
        &self,
        chat_id: u64,
        embedding_client: &dyn crate::embeddings::EmbeddingClient,
        query: &str,
    ) -> Result<Vec<String>, AppError> {
        let chats = self.chats.read().await;
        let chat = chats
            .get(&chat_id)
            .ok_or_else(|| AppError::Validation(format!("unknown chat id {chat_id}")))?;
        match &chat.knowledge_base {
            Some(store) => store.search(embedding_client, query).await,
            None => Ok(Vec::new()),
        }
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            role: self.role,
            content: self.content.clone(),
            sent_at: self.sent_at,
            model_used: self.model_used.clone(),
            predicted_semantic: self.predicted_semantic.clone(),
        }
    }
}
