//! Capability seams around every external service the pipeline talks to.

use crate::error::Result;
use crate::models::*;
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// One embedding per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Top `k` chunks by similarity, best first.
    async fn query_similar(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Session-keyed chat history. Timestamps are always set here, never by callers.
#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    /// Returns the existing session untouched if `session_id` is taken.
    async fn create(&self, session_id: &str, display_name: &str) -> Result<ChatSession>;

    /// Creates the session on first use.
    async fn append(&self, session_id: &str, user_msg: &str, assistant_msg: &str) -> Result<()>;

    /// The last `limit` pairs (all when `None`); unknown sessions yield nothing.
    async fn get(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<MessagePair>>;

    async fn clear(&self, session_id: &str) -> Result<bool>;

    async fn delete(&self, session_id: &str) -> Result<bool>;

    /// Most recently updated first.
    async fn list(&self) -> Result<Vec<SessionSummary>>;

    async fn info(&self, session_id: &str) -> Result<Option<SessionSummary>>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
