use anyhow::{Context, Result};
use clap::Subcommand;

use super::confirm;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::chatbot::ChatBot;

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Start a new chat session and print its id
    New {
        /// User the session belongs to
        #[arg(long, short = 'u')]
        user: Option<String>,
    },

    /// Delete the chat history of every session
    Clear {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },
}

pub async fn handle_session(cmd: SessionCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let bot = ChatBot::from_config(&config).context("failed to initialize chat bot")?;

    match cmd {
        SessionCommand::New { user } => {
            let session = bot
                .initialize_session(user)
                .await
                .context("failed to initialize session")?;
            if verbose {
                eprintln!("History index: {}", bot.history().index());
            }
            print!("{}", formatter.format_session(&session));
        }
        SessionCommand::Clear { force } => {
            if !force && !confirm("This will delete the history of ALL sessions. Continue?")? {
                println!("{}", formatter.format_message("Cancelled."));
                return Ok(());
            }
            bot.history()
                .clear_all_history()
                .await
                .context("failed to clear history")?;
            println!("{}", formatter.format_message("Chat history cleared."));
        }
    }

    Ok(())
}
