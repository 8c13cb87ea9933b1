use rag_chat::{Config, RagSystem, StorageBackend};

/// Shared by every handler behind an `Arc`.
pub struct AppState {
    pub system: RagSystem,
    pub database_name: String,
    pub collection_name: String,
    pub storage_backend: StorageBackend,
    pub default_search_k: usize,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(system: RagSystem, config: &Config) -> Self {
        Self {
            system,
            database_name: config.database_name.clone(),
            collection_name: config.collection_name.clone(),
            storage_backend: config.storage_backend,
            default_search_k: config.similarity_search_limit,
            max_upload_bytes: config.max_upload_size_mb * 1024 * 1024,
        }
    }
}
