use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docquery server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Directory that holds the persisted document store snapshot.
    pub store_dir: String,
    /// Embedding backend used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of a local Ollama runtime, when one is used.
    pub ollama_url: Option<String>,
    /// Number of characters per chunk window.
    pub chunk_size: usize,
    /// Character overlap between adjacent chunks.
    pub chunk_overlap: usize,
    /// Provider used for answer synthesis.
    pub llm_provider: LlmProvider,
    /// Generation model identifier passed to the LLM provider.
    pub llm_model: String,
    /// Upper bound in seconds for a single LLM call.
    pub llm_timeout_secs: u64,
    /// Number of additional attempts after a failed LLM call.
    pub llm_max_retries: u32,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Default number of chunks returned by a search.
    pub search_default_limit: usize,
    /// Hard cap on the number of chunks returned by a search.
    pub search_max_limit: usize,
    /// Default minimum similarity score accepted from the store.
    pub search_default_score_threshold: f32,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic feature-hash embedder requiring no external service.
    Builtin,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported answer-synthesis backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Extractive answers composed from retrieved chunks; no external calls.
    Disabled,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider = load_env_optional("EMBEDDING_PROVIDER")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
            })
            .transpose()?
            .unwrap_or(EmbeddingProvider::Builtin);

        Ok(Self {
            store_dir: load_env_or("DOCUMENT_STORE_DIR", "data/document_store"),
            embedding_provider,
            embedding_model: load_env_or("EMBEDDING_MODEL", "all-minilm-l6-v2"),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?.unwrap_or(384),
            ollama_url: load_env_optional("OLLAMA_URL"),
            chunk_size: parse_env("CHUNK_SIZE")?.unwrap_or(1000),
            chunk_overlap: parse_env("CHUNK_OVERLAP")?.unwrap_or(200),
            llm_provider: load_env_optional("LLM_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(LlmProvider::Disabled),
            llm_model: load_env_or("LLM_MODEL", "llama3"),
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS")?.unwrap_or(30),
            llm_max_retries: parse_env("LLM_MAX_RETRIES")?.unwrap_or(2),
            server_port: parse_env("SERVER_PORT")?,
            search_default_limit: parse_env("SEARCH_DEFAULT_LIMIT")?.unwrap_or(3),
            search_max_limit: parse_env("SEARCH_MAX_LIMIT")?.unwrap_or(50),
            search_default_score_threshold: parse_env("SEARCH_DEFAULT_SCORE_THRESHOLD")?
                .unwrap_or_else(|| default_score_threshold(embedding_provider)),
        })
    }
}

/// The builtin hash embedder produces lower absolute cosine scores than a
/// trained model, so it gets a more permissive retrieval threshold.
const fn default_score_threshold(provider: EmbeddingProvider) -> f32 {
    match provider {
        EmbeddingProvider::Builtin => 0.2,
        EmbeddingProvider::Ollama => 0.5,
    }
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "builtin" => Ok(Self::Builtin),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "disabled" => Ok(Self::Disabled),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
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
        store_dir = %config.store_dir,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        embedding_dimension = config.embedding_dimension,
        llm_provider = ?config.llm_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
