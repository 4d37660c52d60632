use serde::{Deserialize, Serialize};

use super::output::OutputFormat;

pub const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_HISTORY_INDEX: &str = "chathistory";

pub const ENV_LLM_API_KEY: &str = "RAGCHAT_LLM_API_KEY";
pub const ENV_LLM_URL: &str = "RAGCHAT_LLM_URL";
pub const ENV_QDRANT_URL: &str = "RAGCHAT_QDRANT_URL";
pub const ENV_QDRANT_API_KEY: &str = "RAGCHAT_QDRANT_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    pub fn config_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join("ragchat").join("config.toml"))
    }

    /// Loads the config file (defaults when absent) and applies environment overrides.
    pub fn load() -> Result<Self, crate::error::ConfigError> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file() -> Result<Self, crate::error::ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<(), crate::error::ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            crate::error::ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_LLM_API_KEY) {
            self.llm.api_key = Some(key.clone());
            if self.embedding.api_key.is_none() {
                self.embedding.api_key = Some(key);
            }
        }
        if let Some(url) = lookup(ENV_LLM_URL) {
            self.llm.url = url.clone();
            self.embedding.url = url;
        }
        if let Some(url) = lookup(ENV_QDRANT_URL) {
            self.vector_store.url = url;
        }
        if let Some(key) = lookup(ENV_QDRANT_API_KEY) {
            self.vector_store.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError::ValidationError;

        if self.indexing.chunk_size == 0 {
            return Err(ValidationError("indexing.chunk_size must be positive".into()));
        }
        if self.indexing.chunk_overlap >= self.indexing.chunk_size {
            return Err(ValidationError(format!(
                "indexing.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.indexing.chunk_overlap, self.indexing.chunk_size
            )));
        }
        if self.chat.max_messages < 2 {
            return Err(ValidationError("chat.max_messages must be at least 2".into()));
        }
        if self.agent.max_iterations == 0 {
            return Err(ValidationError("agent.max_iterations must be positive".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(ValidationError("embedding.dimension must be positive".into()));
        }
        Ok(())
    }
}

/// How prior turns are pulled into a new turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySearch {
    MostRecent,
    #[default]
    MostRelated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_max_messages")]
    pub max_messages: u64,

    #[serde(default)]
    pub history_search: HistorySearch,

    #[serde(default = "default_history_k")]
    pub history_k: usize,

    #[serde(default)]
    pub history_similarity_threshold: f32,

    #[serde(default = "default_history_index")]
    pub history_index: String,
}

fn default_session_timeout() -> u64 {
    3600
}

fn default_max_messages() -> u64 {
    100
}

fn default_history_k() -> usize {
    4
}

fn default_history_index() -> String {
    DEFAULT_HISTORY_INDEX.to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout(),
            max_messages: default_max_messages(),
            history_search: HistorySearch::default(),
            history_k: default_history_k(),
            history_similarity_threshold: 0.0,
            history_index: default_history_index(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_llm_url() -> String {
    DEFAULT_LLM_URL.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            api_key: None,
            chat_model: default_chat_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Which embedder backs the vector stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_llm_url")]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_batch_size() -> u32 {
    16
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            url: default_llm_url(),
            api_key: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Vector store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Memory,
    Qdrant,
}

impl std::str::FromStr for VectorDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(VectorDriver::Memory),
            "qdrant" => Ok(VectorDriver::Qdrant),
            _ => Err(format!("unknown vector driver: {}", s)),
        }
    }
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Memory => write!(f, "memory"),
            VectorDriver::Qdrant => write!(f, "qdrant"),
        }
    }
}

/// Distance used to rank records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    Euclidean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Snapshot directory for the memory driver. No snapshot when unset.
    #[serde(
        default = "default_snapshot_dir",
        skip_serializing_if = "Option::is_none"
    )]
    pub snapshot_dir: Option<std::path::PathBuf>,

    #[serde(default)]
    pub distance: DistanceMetric,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_snapshot_dir() -> Option<std::path::PathBuf> {
    dirs::data_dir().map(|p| p.join("ragchat"))
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_qdrant_url(),
            api_key: None,
            snapshot_dir: default_snapshot_dir(),
            distance: DistanceMetric::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Path to a HuggingFace `tokenizer.json`; the regex tokenizer is used otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<std::path::PathBuf>,
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/.git/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
    ]
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    400
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: default_exclude_patterns(),
            max_file_size: default_max_file_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            tokenizer_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_top_k() -> usize {
    3
}

fn default_similarity_threshold() -> f32 {
    0.5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time_secs: Option<u64>,
}

fn default_max_iterations() -> usize {
    15
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_execution_time_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: std::path::PathBuf,
}

fn default_database_path() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|p| p.join("ragchat").join("sales.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("sales.db"))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub default_format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.chat.session_timeout_secs, 3600);
        assert_eq!(config.chat.max_messages, 100);
        assert_eq!(config.chat.history_index, DEFAULT_HISTORY_INDEX);
        assert_eq!(config.indexing.chunk_size, 2000);
        assert_eq!(config.indexing.chunk_overlap, 400);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.agent.max_iterations, 15);
        assert_eq!(config.embedding.dimension, DEFAULT_EMBEDDING_DIMENSION);
        assert_eq!(config.vector_store.driver, VectorDriver::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [chat]
            max_messages = 10
            history_search = "most_recent"

            [vector_store]
            driver = "qdrant"
            distance = "euclidean"
            "#,
        )
        .unwrap();
        assert_eq!(config.chat.max_messages, 10);
        assert_eq!(config.chat.history_search, HistorySearch::MostRecent);
        assert_eq!(config.chat.session_timeout_secs, 3600);
        assert_eq!(config.vector_store.driver, VectorDriver::Qdrant);
        assert_eq!(config.vector_store.distance, DistanceMetric::Euclidean);
        assert_eq!(config.vector_store.url, DEFAULT_QDRANT_URL);
    }

    #[test]
    fn test_vector_store_section_keeps_default_snapshot_dir() {
        let config: Config = toml::from_str(
            r#"
            [vector_store]
            driver = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.vector_store.snapshot_dir,
            Config::default().vector_store.snapshot_dir
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_LLM_API_KEY, "sk-test"),
            (ENV_QDRANT_URL, "http://qdrant:6334"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.vector_store.url, "http://qdrant:6334");
        assert_eq!(config.llm.url, DEFAULT_LLM_URL);
    }

    #[test]
    fn test_validate_rejects_bad_overlap() {
        let mut config = Config::default();
        config.indexing.chunk_overlap = config.indexing.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_vector_driver_parse() {
        assert_eq!("qdrant".parse::<VectorDriver>().unwrap(), VectorDriver::Qdrant);
        assert_eq!("Memory".parse::<VectorDriver>().unwrap(), VectorDriver::Memory);
        assert!("pgvector".parse::<VectorDriver>().is_err());
    }
}
