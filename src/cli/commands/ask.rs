use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::chatbot::{AnswerRequest, ChatBot};
use crate::services::intent::Intent;

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer")]
    pub question: String,

    #[arg(long, short = 's', help = "Session id from `session new`")]
    pub session: String,

    #[arg(long, short = 'i', help = "Index holding the documents to answer from")]
    pub index: String,

    #[arg(long, help = "Rephrase the question using prior turns")]
    pub condense: bool,

    #[arg(long, help = "Skip intent detection: doc, structured, or other")]
    pub strategy: Option<Intent>,

    #[arg(long, short = 'u', help = "User asking the question")]
    pub user: Option<String>,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let question = args.question.trim();
    if question.is_empty() {
        anyhow::bail!("question cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let bot = ChatBot::from_config(&config).context("failed to initialize chat bot")?;

    let request = AnswerRequest {
        condense_question: args.condense,
        strategy: args.strategy,
        user_id: args.user,
        ..AnswerRequest::new(args.session.as_str(), question, args.index.as_str())
    };

    if verbose {
        eprintln!("Session: {}", request.session_id);
        eprintln!("  Index: {}", request.index_name);
        if let Some(strategy) = request.strategy {
            eprintln!("  Strategy: {}", strategy);
        }
    }

    let answer = bot.answer(&request).await.context("failed to answer question")?;

    if answer.message.session_id != request.session_id {
        eprintln!(
            "Session {} expired; continued in new session {}",
            request.session_id, answer.message.session_id
        );
    }
    if verbose {
        eprintln!("Answered in {}ms", start_time.elapsed().as_millis());
    }

    print!("{}", formatter.format_answer(&answer));
    Ok(())
}
