use rag_chat::{MessagePair, ScoredChunk, SessionSummary};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub status: String,
    pub session_id: String,
    pub used_web_search: bool,
    pub retrieved_docs_count: usize,
    pub chat_history: Vec<MessagePair>,
}

#[derive(Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub session_id: String,
    pub chat_history: Vec<MessagePair>,
}

#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub session_id: String,
}

#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    pub session_name: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub status: String,
    pub session_id: String,
    pub display_name: String,
}

#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

#[derive(Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub filename: String,
    pub document_id: String,
    pub chunks_created: usize,
    pub total_words: usize,
    pub processing_time: String,
}

#[derive(Deserialize)]
pub struct SearchDebugQuery {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Serialize, Deserialize)]
pub struct SearchDebugResult {
    pub content: String,
    pub score: f32,
    pub chunk_index: u32,
    pub source_file: Option<String>,
    pub page_number: Option<u32>,
}

impl From<ScoredChunk> for SearchDebugResult {
    fn from(scored: ScoredChunk) -> Self {
        Self {
            content: scored.chunk.content,
            score: scored.score,
            chunk_index: scored.chunk.chunk_index,
            source_file: scored.chunk.metadata.source_file,
            page_number: scored.chunk.metadata.page_number,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct SearchDebugResponse {
    pub query: String,
    pub k: usize,
    pub results: Vec<SearchDebugResult>,
}
