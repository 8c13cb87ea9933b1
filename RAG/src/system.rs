use crate::chat_history::{InMemoryChatHistory, MongoChatHistory};
use crate::config::{Config, StorageBackend};
use crate::document_processor::DocumentProcessor;
use crate::document_store::{InMemoryDocumentStore, MongoDocumentStore};
use crate::error::{RagError, Result};
use crate::gemini_service::GeminiService;
use crate::query_service::{QuerySettings, QueryService};
use crate::traits::*;
use crate::web_search::TavilyService;
use mongodb::Client;
use std::sync::Arc;

/// Storage handles and the two pipelines built on top of them.
pub struct RagSystem {
    pub history: Arc<dyn ChatHistoryStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub query_service: QueryService,
    pub processor: DocumentProcessor,
}

/// Components a `RagSystem` is assembled from.
pub struct Parts {
    pub history: Arc<dyn ChatHistoryStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub web_search: Arc<dyn WebSearch>,
}

impl RagSystem {
    /// Opens storage for the configured backend and wires the Gemini and
    /// Tavily clients into the pipelines.
    pub async fn connect(config: &Config) -> Result<Self> {
        let (history, documents): (Arc<dyn ChatHistoryStore>, Arc<dyn DocumentStore>) =
            match config.storage_backend {
                StorageBackend::MongoDb => {
                    let uri = config.mongodb_uri.as_deref().ok_or_else(|| {
                        RagError::Connection("MONGODB_URI is not set".to_string())
                    })?;
                    log::info!("Connecting to MongoDB database {}", config.database_name);
                    let client = Client::with_uri_str(uri).await?;
                    let database = client.database(&config.database_name);
                    (
                        Arc::new(MongoChatHistory::new(
                            database.clone(),
                            &config.chat_collection_name,
                        )),
                        Arc::new(MongoDocumentStore::new(
                            database,
                            &config.collection_name,
                            &config.vector_index_name,
                            &config.embedding_field_name,
                        )),
                    )
                }
                StorageBackend::Memory => {
                    log::warn!("Using in-memory storage; nothing survives a restart");
                    (
                        Arc::new(InMemoryChatHistory::new()),
                        Arc::new(InMemoryDocumentStore::new(config.embedding_dimensions)),
                    )
                }
            };

        let gemini = Arc::new(GeminiService::new(config));
        let parts = Parts {
            history,
            documents,
            embedder: gemini.clone(),
            llm: gemini,
            web_search: Arc::new(TavilyService::new(config)),
        };
        Ok(Self::from_parts(parts, config))
    }

    pub fn from_parts(parts: Parts, config: &Config) -> Self {
        let query_service = QueryService::new(
            parts.history.clone(),
            parts.documents.clone(),
            parts.embedder.clone(),
            parts.llm,
            parts.web_search,
            QuerySettings::from_config(config),
        );
        let processor = DocumentProcessor::new(
            parts.embedder,
            parts.documents.clone(),
            config.chunk_size,
            config.chunk_overlap,
        );

        Self {
            history: parts.history,
            documents: parts.documents,
            query_service,
            processor,
        }
    }

    /// "connected" when both stores answer a ping, otherwise the first error.
    pub async fn database_status(&self) -> String {
        let ping = async {
            self.documents.ping().await?;
            self.history.ping().await
        };
        match ping.await {
            Ok(()) => "connected".to_string(),
            Err(e) => {
                log::warn!("Database ping failed: {}", e);
                format!("error: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn memory_config() -> Config {
        Config::from_lookup(|key| match key {
            "GEMINI_API_KEY" | "TAVILY_API_KEY" => Some("k".to_string()),
            "STORAGE_BACKEND" => Some("memory".to_string()),
            "EMBEDDING_DIMENSIONS" => Some("2".to_string()),
            "CHUNK_SIZE" => Some("10".to_string()),
            "CHUNK_OVERLAP" => Some("2".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let config = memory_config();
        let system = RagSystem::connect(&config).await.unwrap();
        assert_eq!(system.database_status().await, "connected");
        assert!(system.history.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_parts_shares_stores() {
        let config = memory_config();
        let history = Arc::new(InMemoryChatHistory::new());
        let system = RagSystem::from_parts(
            Parts {
                history: history.clone(),
                documents: Arc::new(InMemoryDocumentStore::new(2)),
                embedder: Arc::new(KeywordEmbedder::new(&["alpha", "beta"])),
                llm: Arc::new(ScriptedModel::new("YES", "hi there")),
                web_search: Arc::new(FailingWebSearch::new()),
            },
            &config,
        );

        system.query_service.answer_simple("hello", "s").await.unwrap();
        assert_eq!(history.get("s", None).await.unwrap().len(), 1);
    }
}
