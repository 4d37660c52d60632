//! Command line surface of ragchat.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Retrieval-augmented chat over your documents, with session history.
#[derive(Debug, Parser)]
#[command(name = "ragchat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start or clear chat sessions
    #[command(subcommand)]
    Session(commands::SessionCommand),

    /// Ask a question within a session
    Ask(commands::AskArgs),

    /// Show the messages of a session
    History(commands::HistoryArgs),

    /// Manage document indexes (create, add, search, drop)
    #[command(subcommand)]
    Index(commands::IndexCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),

    /// Check vector store and model settings
    Status,
}
