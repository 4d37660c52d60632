use anyhow::{Context, Result};
use clap::Args;

use super::open_store;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::history::HistoryManager;

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long, short = 's', help = "Session id")]
    pub session: String,

    #[arg(long, short = 'n', help = "Only the last N messages")]
    pub last: Option<usize>,
}

pub async fn handle_history(args: HistoryArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let store = open_store(&config)?;
    let history = HistoryManager::new(store, &config.chat, config.vector_store.distance);

    let messages = match args.last {
        Some(0) => anyhow::bail!("--last must be at least 1"),
        Some(k) => history.get_k_most_recent_messages(&args.session, k).await,
        None => history.get_all_messages(&args.session).await,
    }
    .context("failed to read history")?;

    print!("{}", formatter.format_history(&args.session, &messages));
    Ok(())
}
