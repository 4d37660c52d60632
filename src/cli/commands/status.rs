use anyhow::Result;
use tracing::debug;

use super::open_store;
use crate::cli::output::{IndexSummary, StatusInfo, get_formatter};
use crate::models::{Config, EmbeddingProvider, OutputFormat, VectorDriver};

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let (vector_store_connected, indexes) = match open_store(&config) {
        Ok(store) => {
            let connected = store.health_check().await.unwrap_or(false);
            let mut indexes = Vec::new();
            if connected {
                for name in store.list_indexes().await.unwrap_or_default() {
                    let records = store.count(&name).await.unwrap_or(0);
                    indexes.push(IndexSummary { name, records });
                }
            }
            (connected, indexes)
        }
        Err(e) => {
            debug!("vector store unavailable: {:#}", e);
            (false, Vec::new())
        }
    };

    let vector_store_location = match config.vector_store.driver {
        VectorDriver::Qdrant => config.vector_store.url.clone(),
        VectorDriver::Memory => config
            .vector_store
            .snapshot_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-process (no snapshot)".to_string()),
    };

    let (embedding_provider, embedding_model) = match config.embedding.provider {
        EmbeddingProvider::OpenAi => ("openai", config.embedding.model.clone()),
        EmbeddingProvider::Hashing => ("hashing", format!("{} dims", config.embedding.dimension)),
    };

    let status = StatusInfo {
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_location,
        vector_store_connected,
        indexes,
        history_index: config.chat.history_index.clone(),
        llm_url: config.llm.url.clone(),
        chat_model: config.llm.chat_model.clone(),
        embedding_provider: embedding_provider.to_string(),
        embedding_model,
    };

    print!("{}", formatter.format_status(&status));

    if !vector_store_connected && config.vector_store.driver == VectorDriver::Qdrant {
        eprintln!();
        eprintln!("Warning: Qdrant not running. Start with: docker-compose up -d qdrant");
        eprintln!("      Or switch to the in-memory store: ragchat config set-driver memory");
    }
    if config.llm.api_key.is_none() {
        eprintln!();
        eprintln!("Hint: no LLM API key configured. Set RAGCHAT_LLM_API_KEY or llm.api_key.");
    }

    Ok(())
}
