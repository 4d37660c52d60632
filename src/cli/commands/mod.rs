mod ask;
mod config;
mod history;
mod index;
mod session;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::Config;
use crate::services::embedding::build_embedder;
use crate::services::vector_store::{VectorStore, create_vector_store};

pub use ask::AskArgs;
pub use config::ConfigCommand;
pub use history::HistoryArgs;
pub use index::IndexCommand;
pub use session::SessionCommand;

pub use ask::handle_ask;
pub use config::handle_config;
pub use history::handle_history;
pub use index::handle_index;
pub use session::handle_session;
pub use status::handle_status;

/// The configured vector store, for commands that need no LLM.
fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let embedder = build_embedder(&config.embedding).context("failed to create embedder")?;
    create_vector_store(&config.vector_store, embedder).context("failed to open vector store")
}

/// Asks on stdin; anything but `y` declines.
fn confirm(prompt: &str) -> Result<bool> {
    println!("{} [y/N]", prompt);
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
