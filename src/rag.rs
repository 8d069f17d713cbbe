//! Retrieval-augmented context — chunking and a brute-force vector store.
//!
//! Chunks attached documents with a fixed-size sliding window (chunk size
//! 800, overlap 200, splitting on whitespace) and retrieves the top-k chunks
//! above a relevance-score threshold for a query. Implemented as an
//! in-memory brute-force cosine-similarity store — the scale of a single
//! chat's attached knowledge base doesn't warrant a vector database.

use crate::{
    embeddings::{embed_many_concurrently, EmbeddingClient, EmbeddingVector},
    error::AppError,
};

pub const CHUNK_SIZE: usize = 800;
pub const CHUNK_OVERLAP: usize = 200;

pub const RETRIEVAL_K: usize = 4;
pub const RETRIEVAL_SCORE_THRESHOLD: f64 = 0.6;

/// Split `text` into overlapping windows on whitespace boundaries: each chunk
/// is up to `CHUNK_SIZE` characters, and successive chunks share
/// `CHUNK_OVERLAP` characters of context so no boundary silently drops
/// a sentence that straddles two chunks.
pub fn chunk_text(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_SIZE {
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let words: Vec<&str> = text.split(' ').collect();
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in &words {
        if !current.is_empty() && current.len() + 1 + word.len() > CHUNK_SIZE {
            chunks.push(current.clone());
            let overlap_start = current.len().saturating_sub(CHUNK_OVERLAP);
            current = current[overlap_start..].to_string();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

/// A brute-force, in-memory nearest-neighbor store over embedded text
/// chunks, scoped to a single chat's attached knowledge base.
pub struct VectorStore {
    entries: Vec<(String, EmbeddingVector)>,
}

impl VectorStore {
    /// Chunk `text`, embed every chunk, and build a store from the result.
    pub async fn build(
        embedding_client: &dyn EmbeddingClient,
        text: &str,
    ) -> Result<Self, AppError> {
        let chunks = chunk_text(text);
        if chunks.is_empty() {
            return Ok(Self { entries: Vec::new() });
        }
        let embeddings = embed_many_concurrently(embedding_client, &chunks).await?;
        Ok(Self {
            entries: chunks.into_iter().zip(embeddings).collect(),
        })
    }

    /// Return up to [`RETRIEVAL_K`] chunks whose cosine similarity to `query`
    /// clears [`RETRIEVAL_SCORE_THRESHOLD`], ranked highest first.
    pub async fn search(
        &self,
        embedding_client: &dyn EmbeddingClient,
        query: &str,
    ) -> Result<Vec<String>, AppError> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = embedding_client.embed_one(query).await?;

        let mut scored: Vec<(f64, &str)> = self
            .entries
            .iter()
            .map(|(chunk, embedding)| (embedding.cosine_similarity(&query_embedding), chunk.as_str()))
            .filter(|(score, _)| *score >= RETRIEVAL_SCORE_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(RETRIEVAL_K);

        Ok(scored.into_iter().map(|(_, chunk)| chunk.to_string()).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Join retrieved chunks into the context block the Completion Driver
/// prepends as a system message.
pub fn build_context_block(chunks: &[String]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    Some(format!(
        "Use the following context to answer the question:\n\n{}",
        chunks.join("\n\n---\n\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn chunk_text_returns_single_chunk_for_short_text() {
        let chunks = chunk_text("a short sentence");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn chunk_text_returns_nothing_for_blank_text() {
        assert!(chunk_text("   ").is_empty());
    }

    #[test]
    fn chunk_text_splits_long_text_into_overlapping_windows() {
        let text = "word ".repeat(400);
        let chunks = chunk_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= CHUNK_SIZE + 10);
        }
    }

    #[test]
    fn chunk_text_overlap_shares_trailing_context_between_chunks() {
        let text = "word ".repeat(400);
        let chunks = chunk_text(&text);
        let first_tail: Vec<&str> = chunks[0].split(' ').rev().take(5).collect();
        let second_head: Vec<&str> = chunks[1].split(' ').take(5).collect();
        assert!(
            first_tail.iter().any(|w| second_head.contains(w)),
            "expected overlapping words between consecutive chunks"
        );
    }

    struct HashEmbeddingClient;

    #[async_trait]
    impl EmbeddingClient for HashEmbeddingClient {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, AppError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 26];
                    if let Some(c) = t.chars().next() {
                        let idx = (c.to_ascii_lowercase() as u8).saturating_sub(b'a') as usize;
                        if idx < 26 {
                            v[idx] = 1.0;
                        }
                    }
                    EmbeddingVector(v)
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn search_returns_nothing_for_empty_store() {
        let client = HashEmbeddingClient;
        let store = VectorStore::build(&client, "").await.unwrap();
        assert!(store.is_empty());
        assert!(store.search(&client, "anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_finds_matching_chunk_above_threshold() {
        let client = HashEmbeddingClient;
        let store = VectorStore::build(&client, "apple pie recipe").await.unwrap();
        let results = store.search(&client, "apple").await.unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn build_context_block_is_none_for_no_chunks() {
        assert!(build_context_block(&[]).is_none());
    }

    #[test]
    fn build_context_block_joins_chunks_with_separator() {
        let block = build_context_block(&["a".into(), "b".into()]).unwrap();
        assert!(block.contains("a"));
        assert!(block.contains("b"));
    }
}
