mod answer;
mod config;
mod message;
mod output;
mod record;

pub use answer::{Answer, Sources};
pub use config::{
    AgentConfig, ChatConfig, Config, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_HISTORY_INDEX,
    DEFAULT_QDRANT_URL, DatabaseConfig, DistanceMetric, EmbeddingConfig, EmbeddingProvider,
    HistorySearch, IndexingConfig, LlmConfig, RetrievalConfig, VectorDriver, VectorStoreConfig,
};
pub use message::{
    ChatMessage, IS_BOT_FIELD, Message, RECEIVED_FIELD, RESPONDED_FIELD, Role, SEQUENCE_NUM_FIELD,
    SESSION_ID_FIELD, USER_ID_FIELD,
};
pub use output::OutputFormat;
pub use record::{
    CONTENT_FIELD, FieldKind, FieldSpec, IndexSchema, Metadata, MetadataFilter, MetadataValue,
    RECORD_KEY_FIELD, Record,
};
