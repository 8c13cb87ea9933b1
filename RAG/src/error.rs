use crate::config::ConfigError;

/// Errors surfaced by the RAG library.
///
/// Web-search failures never show up here: the orchestrator swallows them and
/// answers from local context instead.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("{service} API error: {status} - {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("PDF error: {0}")]
    Pdf(String),
}

impl From<mongodb::bson::de::Error> for RagError {
    fn from(e: mongodb::bson::de::Error) -> Self {
        RagError::Connection(format!("malformed record: {}", e))
    }
}

impl From<mongodb::bson::ser::Error> for RagError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        RagError::InvalidInput(format!("unserializable record: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
