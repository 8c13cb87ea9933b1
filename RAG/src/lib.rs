pub mod chat_history;
pub mod config;
pub mod document_processor;
pub mod document_store;
pub mod error;
pub mod gemini_service;
pub mod models;
pub mod prompts;
pub mod query_service;
pub mod system;
pub mod traits;
pub mod web_search;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use models::*;
pub use config::{Config, ConfigError, Endpoints, StorageBackend};
pub use document_processor::DocumentProcessor;
pub use error::{RagError, Result};
pub use gemini_service::GeminiService;
pub use query_service::{QuerySettings, QueryService};
pub use system::{Parts, RagSystem};
pub use web_search::TavilyService;
