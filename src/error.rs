//! Error types for the conversation engine.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => is_transient_status(msg),
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_) | EmbeddingError::DimensionMismatch { .. } => false,
        }
    }
}

/// Errors related to chat completion calls.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("failed to connect to completion server: {0}")]
    ConnectionError(String),

    #[error("completion server error: {0}")]
    ServerError(String),

    #[error("completion request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),

    #[error("completion timeout")]
    Timeout,
}

impl Retryable for CompletionError {
    fn is_retryable(&self) -> bool {
        match self {
            CompletionError::ConnectionError(_) | CompletionError::Timeout => true,
            CompletionError::ServerError(msg) => is_transient_status(msg),
            CompletionError::RequestError(e) => e.is_timeout() || e.is_connect(),
            CompletionError::InvalidResponse(_) => false,
        }
    }
}

fn is_transient_status(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    msg.contains("503")
        || msg.contains("502")
        || msg.contains("504")
        || msg.contains("429")
        || lower.contains("unavailable")
        || lower.contains("too many requests")
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("index not found: {0}")]
    NotFound(String),

    #[error("index already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid index schema: {0}")]
    InvalidSchema(String),

    #[error("record does not match index schema: {0}")]
    SchemaMismatch(String),

    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("snapshot error: {0}")]
    SnapshotError(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionError(_) => true,
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::UpsertError(msg)
            | VectorStoreError::SearchError(msg)
            | VectorStoreError::DeleteError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
            VectorStoreError::Embedding(e) => e.is_retryable(),
            VectorStoreError::NotFound(_)
            | VectorStoreError::AlreadyExists(_)
            | VectorStoreError::InvalidSchema(_)
            | VectorStoreError::SchemaMismatch(_)
            | VectorStoreError::SnapshotError(_) => false,
        }
    }
}

/// Errors related to document ingestion and indexing.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("document produced no text: {0}")]
    EmptyDocument(String),

    #[error("invalid chunk configuration: {0}")]
    InvalidChunkConfig(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// Errors related to chat history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("malformed history record: {0}")]
    Decode(String),
}

/// Errors raised by the tool-execution loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool `{tool}` is missing required argument `{argument}`")]
    MissingArgument { tool: String, argument: String },

    #[error("agent stopped after {0} iterations without a final answer")]
    LoopExceeded(usize),

    #[error("agent exceeded its time budget of {0:?}")]
    TimeLimitExceeded(std::time::Duration),

    #[error("could not parse planner output: {0}")]
    ParseError(String),

    #[error("invalid tool registry: {0}")]
    InvalidRegistry(String),

    #[error("tool `{tool}` failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),
}

/// Errors surfaced by a conversation turn.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("invalid question: {0}")]
    InvalidQuestion(String),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}
