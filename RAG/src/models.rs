use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// One exchange: (user text, assistant text). Serialized as a two-element array.
pub type MessagePair = (String, String);

pub const DEFAULT_SESSION_ID: &str = "default_session";

/// Older records may lack `display_name` and `message_count` and carry naive
/// ISO timestamps; see `ChatSession::backfill`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub messages: Vec<MessagePair>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u32,
}

impl ChatSession {
    pub fn new(id: &str, display_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
            message_count: 0,
        }
    }

    /// Fills fields missing from older records: the display name falls back
    /// to the id and the count to the number of stored pairs.
    pub fn backfill(mut self) -> Self {
        if self.display_name.is_empty() {
            self.display_name = self.id.clone();
        }
        if self.message_count == 0 && !self.messages.is_empty() {
            self.message_count = self.messages.len() as u32;
        }
        self
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            display_name: self.display_name.clone(),
            message_count: self.message_count,
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }

    /// The last `limit` pairs in insertion order, or all of them.
    pub fn recent(&self, limit: Option<usize>) -> Vec<MessagePair> {
        let skip = match limit {
            Some(limit) => self.messages.len().saturating_sub(limit),
            None => 0,
        };
        self.messages[skip..].to_vec()
    }
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.ffffff]` read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| de::Error::custom(format!("unrecognized timestamp {:?}", raw)))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub display_name: String,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub source_file: Option<String>,
    pub page_number: Option<u32>,
    pub word_count: u32,
    pub upload_timestamp: DateTime<Utc>,
    pub document_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub document_id: String,
    pub content: String,
    pub chunk_index: u32,
    /// Left out of vector search projections, hence the default.
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sufficiency {
    Sufficient,
    Insufficient,
    /// Nothing was retrieved, so the model was never asked.
    NoChunks,
    /// The model's verdict could not be read as yes or no.
    Unclear,
    /// The sufficiency call itself failed.
    CheckFailed,
}

impl Sufficiency {
    pub fn is_sufficient(self) -> bool {
        self == Sufficiency::Sufficient
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub used_web_search: bool,
    pub sufficiency: Sufficiency,
    pub retrieved_chunks: Vec<ScoredChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub filename: String,
    pub chunks_created: usize,
    pub total_words: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiCandidate {
    pub content: GeminiContent,
}

#[derive(Debug, Serialize)]
pub struct GeminiEmbedRequest {
    pub model: String,
    pub content: GeminiContent,
}

#[derive(Debug, Serialize)]
pub struct GeminiBatchEmbedRequest {
    pub requests: Vec<GeminiEmbedRequest>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiEmbedding {
    pub values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiEmbedResponse {
    pub embedding: GeminiEmbedding,
}

#[derive(Debug, Deserialize)]
pub struct GeminiBatchEmbedResponse {
    #[serde(default)]
    pub embeddings: Vec<GeminiEmbedding>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(n: usize) -> ChatSession {
        let mut session = ChatSession::new("s", "s", Utc::now());
        for i in 0..n {
            session.messages.push((format!("q{}", i), format!("a{}", i)));
        }
        session.message_count = n as u32;
        session
    }

    #[test]
    fn test_recent_keeps_tail_in_order() {
        let session = session_with(7);
        let recent = session.recent(Some(3));
        assert_eq!(
            recent,
            vec![
                ("q4".to_string(), "a4".to_string()),
                ("q5".to_string(), "a5".to_string()),
                ("q6".to_string(), "a6".to_string()),
            ]
        );
        assert_eq!(session.recent(Some(50)).len(), 7);
        assert_eq!(session.recent(None).len(), 7);
    }

    #[test]
    fn test_session_record_shape() {
        let session = session_with(1);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["_id"], "s");
        assert_eq!(value["messages"][0][0], "q0");
        assert_eq!(value["messages"][0][1], "a0");
        assert_eq!(value["message_count"], 1);
        assert!(value["created_at"].is_string());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let naive = parse_timestamp("2025-03-01T10:00:00.123456").unwrap();
        assert_eq!(naive.to_rfc3339(), "2025-03-01T10:00:00.123456+00:00");
        assert!(parse_timestamp("2025-03-01T10:00:00").is_some());
        assert!(parse_timestamp("2025-03-01T10:00:00.5+02:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_timestamps_round_trip() {
        let session = session_with(2);
        let value = serde_json::to_value(&session).unwrap();
        let decoded: ChatSession = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, session);
    }

    #[test]
    fn test_gemini_request_uses_camel_case() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: "hi".to_string(),
                }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature: 0.5,
                max_output_tokens: 10,
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 10);
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_gemini_response_without_candidates() {
        let response: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert!(response.candidates.is_empty());
    }
}
