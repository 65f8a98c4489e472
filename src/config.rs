use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Cividex server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the content-safety classification service.
    pub content_safety_url: String,
    /// Optional API key for the content-safety service.
    pub content_safety_key: Option<String>,
    /// Base URL of the embedding model service. When absent, the local
    /// deterministic encoder is used instead.
    pub embedding_url: Option<String>,
    /// Optional API key for the embedding service.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the vector search index service. When absent, the
    /// retrieval path operates in degraded mode.
    pub search_index_url: Option<String>,
    /// Name of the search index that stores chunk records.
    pub search_index_name: String,
    /// Optional API key required to access the search index.
    pub search_api_key: Option<String>,
    /// Optional override for the chunk token ceiling (default 800).
    pub chunk_size: Option<usize>,
    /// Optional override for the chunk token overlap (default 100).
    pub chunk_overlap: Option<usize>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            content_safety_url: load_env("CONTENT_SAFETY_URL")?,
            content_safety_key: load_env_optional("CONTENT_SAFETY_KEY"),
            embedding_url: load_env_optional("EMBEDDING_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            search_index_url: load_env_optional("SEARCH_INDEX_URL"),
            search_index_name: load_env("SEARCH_INDEX_NAME")?,
            search_api_key: load_env_optional("SEARCH_API_KEY"),
            chunk_size: parse_optional("CHUNK_SIZE")?,
            chunk_overlap: parse_optional("CHUNK_OVERLAP")?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional(key: &str) -> Result<Option<usize>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        safety_url = %config.content_safety_url,
        index = %config.search_index_name,
        index_configured = config.search_index_url.is_some(),
        embedding_configured = config.embedding_url.is_some(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
