use std::env;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::MongoDb => write!(f, "mongodb"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Host/port pairs of the two processes (API server and browser UI).
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub api_host: String,
    pub api_port: u16,
    pub ui_host: String,
    pub ui_port: u16,
}

impl Endpoints {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            api_host: lookup("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            api_port: parse_or(&lookup, "API_PORT", 8000)?,
            ui_host: lookup("UI_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            ui_port: parse_or(&lookup, "UI_PORT", 7860)?,
        })
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn ui_addr(&self) -> String {
        format!("{}:{}", self.ui_host, self.ui_port)
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}", self.api_addr())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub tavily_api_key: String,
    pub mongodb_uri: Option<String>,
    pub storage_backend: StorageBackend,

    pub database_name: String,
    pub collection_name: String,
    pub chat_collection_name: String,
    pub embedding_field_name: String,
    pub vector_index_name: String,

    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub tavily_base_url: String,

    pub endpoints: Endpoints,

    /// Window size in words.
    pub chunk_size: usize,
    /// Words shared by consecutive windows.
    pub chunk_overlap: usize,

    pub similarity_search_limit: usize,
    pub chat_history_limit: usize,
    pub web_search_max_results: usize,
    pub retrieval_temperature: f32,
    pub history_temperature: f32,
    pub debug_pipeline_decisions: bool,
    pub max_upload_size_mb: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Every missing
    /// secret is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_backend = match lookup("STORAGE_BACKEND").as_deref() {
            None | Some("mongodb") => StorageBackend::MongoDb,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND".to_string(),
                    value: other.to_string(),
                    reason: "expected \"mongodb\" or \"memory\"".to_string(),
                })
            }
        };

        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let gemini_api_key = secret("GEMINI_API_KEY");
        let tavily_api_key = secret("TAVILY_API_KEY");
        let mongodb_uri = secret("MONGODB_URI");

        let mut missing = Vec::new();
        if gemini_api_key.is_none() {
            missing.push("GEMINI_API_KEY".to_string());
        }
        if tavily_api_key.is_none() {
            missing.push("TAVILY_API_KEY".to_string());
        }
        if storage_backend == StorageBackend::MongoDb && mongodb_uri.is_none() {
            missing.push("MONGODB_URI".to_string());
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            gemini_api_key: gemini_api_key.unwrap_or_default(),
            tavily_api_key: tavily_api_key.unwrap_or_default(),
            mongodb_uri,
            storage_backend,
            database_name: or_default("DATABASE_NAME", "knowledge_base"),
            collection_name: or_default("COLLECTION_NAME", "documents"),
            chat_collection_name: or_default("CHAT_COLLECTION_NAME", "simple_chats"),
            embedding_field_name: or_default("EMBEDDING_FIELD_NAME", "embedding"),
            vector_index_name: or_default("VECTOR_INDEX_NAME", "vector_search"),
            embedding_model: or_default("EMBEDDING_MODEL_NAME", "text-embedding-004"),
            embedding_dimensions: parse_or(&lookup, "EMBEDDING_DIMENSIONS", 768)?,
            gemini_model: or_default("GEMINI_MODEL", "gemini-2.0-flash"),
            gemini_base_url: or_default(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            tavily_base_url: or_default("TAVILY_BASE_URL", "https://api.tavily.com"),
            endpoints: Endpoints::from_lookup(&lookup)?,
            chunk_size: parse_or(&lookup, "CHUNK_SIZE", 3500)?,
            chunk_overlap: parse_or(&lookup, "CHUNK_OVERLAP", 150)?,
            similarity_search_limit: parse_or(&lookup, "SIMILARITY_SEARCH_LIMIT", 5)?,
            chat_history_limit: parse_or(&lookup, "CHAT_HISTORY_LIMIT", 5)?,
            web_search_max_results: parse_or(&lookup, "WEB_SEARCH_MAX_RESULTS", 3)?,
            retrieval_temperature: parse_or(&lookup, "RETRIEVAL_TEMPERATURE", 0.2)?,
            history_temperature: parse_or(&lookup, "HISTORY_TEMPERATURE", 0.3)?,
            debug_pipeline_decisions: parse_bool_or(&lookup, "DEBUG_PIPELINE_DECISIONS", true),
            max_upload_size_mb: parse_or(&lookup, "MAX_UPLOAD_SIZE_MB", 20)?,
        };

        if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::Invalid {
                key: "CHUNK_OVERLAP".to_string(),
                value: config.chunk_overlap.to_string(),
                reason: format!("must be smaller than CHUNK_SIZE ({})", config.chunk_size),
            });
        }
        if config.embedding_dimensions == 0 {
            return Err(ConfigError::Invalid {
                key: "EMBEDDING_DIMENSIONS".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(config)
    }

    /// Logs the effective configuration without any secret values.
    pub fn log_summary(&self) {
        let set = |present: bool| if present { "set" } else { "missing" };
        log::info!("Storage backend: {}", self.storage_backend);
        log::info!(
            "Database: {} (documents: {}, chats: {})",
            self.database_name,
            self.collection_name,
            self.chat_collection_name
        );
        log::info!(
            "Vector index: {} on field '{}'",
            self.vector_index_name,
            self.embedding_field_name
        );
        log::info!(
            "Embedding model: {} ({} dims), chat model: {}",
            self.embedding_model,
            self.embedding_dimensions,
            self.gemini_model
        );
        log::info!(
            "API server: {}, UI: {}",
            self.endpoints.api_addr(),
            self.endpoints.ui_addr()
        );
        log::info!(
            "Chunking: {} words, {} overlap; retrieval limit {}, history limit {}",
            self.chunk_size,
            self.chunk_overlap,
            self.similarity_search_limit,
            self.chat_history_limit
        );
        log::info!(
            "Temperatures: retrieval {}, history {}",
            self.retrieval_temperature,
            self.history_temperature
        );
        log::info!(
            "Gemini API key: {}, Tavily API key: {}, MongoDB URI: {}",
            set(!self.gemini_api_key.is_empty()),
            set(!self.tavily_api_key.is_empty()),
            set(self.mongodb_uri.is_some())
        );
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRETS: [(&str, &str); 3] = [
        ("GEMINI_API_KEY", "gemini-key"),
        ("TAVILY_API_KEY", "tavily-key"),
        ("MONGODB_URI", "mongodb://localhost:27017"),
    ];

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup_from(&SECRETS)).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::MongoDb);
        assert_eq!(config.database_name, "knowledge_base");
        assert_eq!(config.chat_collection_name, "simple_chats");
        assert_eq!(config.chunk_size, 3500);
        assert_eq!(config.chunk_overlap, 150);
        assert_eq!(config.similarity_search_limit, 5);
        assert_eq!(config.chat_history_limit, 5);
        assert_eq!(config.endpoints.api_addr(), "127.0.0.1:8000");
        assert_eq!(config.endpoints.ui_addr(), "127.0.0.1:7860");
        assert!(config.debug_pipeline_decisions);
    }

    #[test]
    fn test_all_missing_secrets_reported() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing(vec![
                "GEMINI_API_KEY".to_string(),
                "TAVILY_API_KEY".to_string(),
                "MONGODB_URI".to_string(),
            ])
        );
    }

    #[test]
    fn test_blank_secret_counts_as_missing() {
        let err = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "  "),
            ("TAVILY_API_KEY", "t"),
            ("MONGODB_URI", "mongodb://x"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(vec!["GEMINI_API_KEY".to_string()]));
    }

    #[test]
    fn test_memory_backend_does_not_need_mongodb() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "g"),
            ("TAVILY_API_KEY", "t"),
            ("STORAGE_BACKEND", "memory"),
        ]))
        .unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(config.mongodb_uri.is_none());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("CHUNK_SIZE", "100"));
        pairs.push(("CHUNK_OVERLAP", "100"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "CHUNK_OVERLAP"));
    }

    #[test]
    fn test_unparseable_number_rejected() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("API_PORT", "eighty"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "API_PORT"));
    }

    #[test]
    fn test_endpoints_without_secrets() {
        let endpoints =
            Endpoints::from_lookup(lookup_from(&[("API_PORT", "9000"), ("UI_HOST", "0.0.0.0")]))
                .unwrap();
        assert_eq!(endpoints.api_base_url(), "http://127.0.0.1:9000");
        assert_eq!(endpoints.ui_addr(), "0.0.0.0:7860");
    }
}
