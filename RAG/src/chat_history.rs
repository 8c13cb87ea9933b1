use crate::error::Result;
use crate::models::*;
use crate::traits::ChatHistoryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::{Collection, Database};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

const MAX_SESSION_NAME_LEN: usize = 30;

/// Chat sessions stored one document per session id.
pub struct MongoChatHistory {
    database: Database,
    collection: Collection<Document>,
}

impl MongoChatHistory {
    pub fn new(database: Database, collection_name: &str) -> Self {
        let collection = database.collection::<Document>(collection_name);
        Self {
            database,
            collection,
        }
    }

    async fn find(&self, session_id: &str) -> Result<Option<ChatSession>> {
        self.collection
            .find_one(doc! { "_id": session_id })
            .await?
            .map(decode_session)
            .transpose()
    }
}

fn decode_session(document: Document) -> Result<ChatSession> {
    Ok(bson::from_document::<ChatSession>(document)?.backfill())
}

fn timestamp(now: DateTime<Utc>) -> Result<bson::Bson> {
    Ok(bson::to_bson(&now)?)
}

#[async_trait]
impl ChatHistoryStore for MongoChatHistory {
    async fn create(&self, session_id: &str, display_name: &str) -> Result<ChatSession> {
        let now = timestamp(Utc::now())?;
        self.collection
            .update_one(
                doc! { "_id": session_id },
                doc! {
                    "$setOnInsert": {
                        "display_name": display_name,
                        "messages": [],
                        "created_at": now.clone(),
                        "last_updated": now,
                        "message_count": 0_i64,
                    }
                },
            )
            .upsert(true)
            .await?;

        self.find(session_id).await?.ok_or_else(|| {
            crate::error::RagError::Connection(format!("session {} vanished after upsert", session_id))
        })
    }

    async fn append(&self, session_id: &str, user_msg: &str, assistant_msg: &str) -> Result<()> {
        let now = timestamp(Utc::now())?;
        // $push and $inc in one update keep message_count equal to messages.len().
        self.collection
            .update_one(
                doc! { "_id": session_id },
                doc! {
                    "$push": { "messages": [user_msg, assistant_msg] },
                    "$inc": { "message_count": 1_i64 },
                    "$set": { "last_updated": now.clone() },
                    "$setOnInsert": {
                        "display_name": session_id,
                        "created_at": now,
                    },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn get(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<MessagePair>> {
        Ok(self
            .find(session_id)
            .await?
            .map(|session| session.recent(limit))
            .unwrap_or_default())
    }

    async fn clear(&self, session_id: &str) -> Result<bool> {
        let now = timestamp(Utc::now())?;
        let result = self
            .collection
            .update_one(
                doc! { "_id": session_id },
                doc! {
                    "$set": {
                        "messages": [],
                        "message_count": 0_i64,
                        "last_updated": now,
                    }
                },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": session_id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let documents: Vec<Document> = self.collection.find(doc! {}).await?.try_collect().await?;
        let sessions: Vec<ChatSession> = documents
            .into_iter()
            .filter_map(|document| {
                let id = document.get("_id").map(|id| id.to_string()).unwrap_or_default();
                match decode_session(document) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        log::warn!("Skipping unreadable session record {}: {}", id, e);
                        None
                    }
                }
            })
            .collect();
        Ok(sorted_summaries(sessions.iter()))
    }

    async fn info(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        Ok(self.find(session_id).await?.map(|s| s.summary()))
    }

    async fn ping(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

/// Process-local history, mostly for tests and `STORAGE_BACKEND=memory`.
#[derive(Default)]
pub struct InMemoryChatHistory {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl InMemoryChatHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatHistoryStore for InMemoryChatHistory {
    async fn create(&self, session_id: &str, display_name: &str) -> Result<ChatSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| ChatSession::new(session_id, display_name, Utc::now()));
        Ok(session.clone())
    }

    async fn append(&self, session_id: &str, user_msg: &str, assistant_msg: &str) -> Result<()> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| ChatSession::new(session_id, session_id, now));
        session
            .messages
            .push((user_msg.to_string(), assistant_msg.to_string()));
        session.message_count = session.messages.len() as u32;
        session.last_updated = now;
        Ok(())
    }

    async fn get(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<MessagePair>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|session| session.recent(limit))
            .unwrap_or_default())
    }

    async fn clear(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.messages.clear();
                session.message_count = 0;
                session.last_updated = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        Ok(sorted_summaries(self.sessions.read().await.values()))
    }

    async fn info(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.summary()))
    }
}

fn sorted_summaries<'a>(sessions: impl Iterator<Item = &'a ChatSession>) -> Vec<SessionSummary> {
    let mut summaries: Vec<SessionSummary> = sessions.map(|s| s.summary()).collect();
    summaries.sort_by(|a, b| {
        b.last_updated
            .cmp(&a.last_updated)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    summaries
}

/// Renders history as the "Previous conversation" block of a prompt.
pub fn format_history(history: &[MessagePair]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut formatted = String::from("Previous conversation:\n");
    for (user_msg, assistant_msg) in history {
        formatted.push_str(&format!("User: {}\n", user_msg));
        formatted.push_str(&format!("Assistant: {}\n", assistant_msg));
    }
    formatted
}

/// Turns a user-facing session name into an id: letters and digits (Unicode
/// included, lowercased) plus `_` and `-`, spaces become `_`, at most 30
/// characters, followed by a random suffix so names can repeat.
pub fn session_id_from_name(name: &str) -> (String, String) {
    let cleaned: String = name
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .map(|c| if c == ' ' { '_' } else { c })
        .flat_map(char::to_lowercase)
        .take(MAX_SESSION_NAME_LEN)
        .collect();
    let display_name = if cleaned.is_empty() {
        "session".to_string()
    } else {
        cleaned
    };

    let suffix = Uuid::new_v4().simple().to_string();
    let session_id = format!("{}_{}", display_name, &suffix[..6]);
    (session_id, display_name)
}
