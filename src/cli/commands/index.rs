//! Index command implementation.

use anyhow::{Context, Result};
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;

use super::{confirm, open_store};
use crate::cli::output::{IndexStats, SearchHit, SearchHits, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::indexer::Indexer;
use crate::services::loader::{collect_files, is_web_url};

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Create an empty document index
    Create {
        #[arg(required = true)]
        name: String,
    },

    /// Drop an index and everything in it
    Drop {
        #[arg(required = true)]
        name: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },

    /// Drop every index, chat history included
    DropAll {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },

    /// Add files, directories or web pages to an index
    Add {
        #[arg(required = true)]
        name: String,

        /// Files, directories, or http(s) URLs
        #[arg(required = true)]
        sources: Vec<String>,

        /// File patterns to exclude (can be specified multiple times)
        #[arg(long, short = 'e')]
        exclude: Vec<String>,

        /// Show what would be indexed without actually indexing
        #[arg(long)]
        dry_run: bool,
    },

    /// Similarity search over an index
    Search {
        #[arg(required = true)]
        name: String,

        #[arg(required = true)]
        query: String,

        /// Maximum number of results to return
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
}

pub async fn handle_index(cmd: IndexCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let indexer = Indexer::from_config(&config, store).context("failed to create indexer")?;

    match cmd {
        IndexCommand::Create { name } => handle_create(&indexer, &name, format).await,
        IndexCommand::Drop { name, force } => handle_drop(&indexer, &name, force, format).await,
        IndexCommand::DropAll { force } => handle_drop_all(&indexer, force, format).await,
        IndexCommand::Add {
            name,
            sources,
            exclude,
            dry_run,
        } => handle_add(&indexer, &config, &name, sources, exclude, dry_run, format, verbose).await,
        IndexCommand::Search { name, query, limit } => {
            handle_search(&indexer, &config, &name, &query, limit, format, verbose).await
        }
    }
}

async fn handle_create(indexer: &Indexer, name: &str, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if indexer.store().check_existing_index(name).await {
        println!(
            "{}",
            formatter.format_message(&format!("Index '{}' already exists.", name))
        );
        return Ok(());
    }

    indexer
        .create_index(name)
        .await
        .with_context(|| format!("failed to create index '{}'", name))?;
    println!(
        "{}",
        formatter.format_message(&format!("Created index '{}'.", name))
    );
    Ok(())
}

async fn handle_drop(indexer: &Indexer, name: &str, force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if !force && !confirm(&format!("This will drop index '{}'. Continue?", name))? {
        println!("{}", formatter.format_message("Cancelled."));
        return Ok(());
    }

    indexer
        .drop_index(name)
        .await
        .with_context(|| format!("failed to drop index '{}'", name))?;
    println!(
        "{}",
        formatter.format_message(&format!("Dropped index '{}'.", name))
    );
    Ok(())
}

async fn handle_drop_all(indexer: &Indexer, force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if !force && !confirm("This will drop ALL indexes, chat history included. Continue?")? {
        println!("{}", formatter.format_message("Cancelled."));
        return Ok(());
    }

    let dropped = indexer
        .drop_all_indexes()
        .await
        .context("failed to drop indexes")?;
    let message = if dropped.is_empty() {
        "No indexes to drop.".to_string()
    } else {
        format!("Dropped {} index(es): {}", dropped.len(), dropped.join(", "))
    };
    println!("{}", formatter.format_message(&message));
    Ok(())
}

/// Expands directories into their text files; URLs and files pass through.
fn expand_sources(
    sources: &[String],
    exclude: &[String],
    default_exclude: &[String],
) -> Result<Vec<String>> {
    let patterns: Vec<String> = exclude.iter().chain(default_exclude).cloned().collect();
    let mut expanded = Vec::new();
    for source in sources {
        if is_web_url(source) {
            expanded.push(source.clone());
            continue;
        }
        let path = Path::new(source);
        if path.is_dir() {
            let files = collect_files(path, &patterns)
                .with_context(|| format!("failed to walk {}", path.display()))?;
            expanded.extend(files.into_iter().map(|f| f.to_string_lossy().to_string()));
        } else {
            expanded.push(source.clone());
        }
    }
    Ok(expanded)
}

#[allow(clippy::too_many_arguments)]
async fn handle_add(
    indexer: &Indexer,
    config: &Config,
    name: &str,
    sources: Vec<String>,
    exclude: Vec<String>,
    dry_run: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let sources = expand_sources(&sources, &exclude, &config.indexing.exclude_patterns)?;
    if sources.is_empty() {
        println!("{}", formatter.format_message("No sources found to index."));
        return Ok(());
    }

    if verbose {
        eprintln!("Found {} sources to process", sources.len());
    }

    if dry_run {
        println!(
            "{}",
            formatter.format_message(&format!(
                "Dry run: Would index {} sources into '{}'",
                sources.len(),
                name
            ))
        );
        for source in &sources {
            println!("  {}", source);
        }
        return Ok(());
    }

    if !indexer.store().check_existing_index(name).await {
        indexer
            .create_index(name)
            .await
            .with_context(|| format!("failed to create index '{}'", name))?;
        if verbose {
            eprintln!("Created index '{}'", name);
        }
    }

    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut stats = IndexStats {
        index: name.to_string(),
        sources_scanned: sources.len() as u64,
        ..Default::default()
    };

    for source in &sources {
        pb.inc(1);
        match indexer.add_document(source, name).await {
            Ok(chunks) => {
                stats.sources_indexed += 1;
                stats.chunks_created += chunks as u64;
            }
            Err(e) => {
                stats.sources_skipped += 1;
                pb.println(format!("Skipping {}: {}", source, e));
            }
        }
    }

    pb.finish_and_clear();
    stats.duration_ms = start_time.elapsed().as_millis() as u64;
    print!("{}", formatter.format_index_stats(&stats));

    Ok(())
}

async fn handle_search(
    indexer: &Indexer,
    config: &Config,
    name: &str,
    query: &str,
    limit: Option<usize>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let limit = limit.unwrap_or(config.retrieval.top_k);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Index: {name}");
        eprintln!("  Limit: {limit}");
    }

    let hits = indexer
        .similarity_search(query, limit, None, name)
        .await
        .with_context(|| format!("search in '{}' failed", name))?;

    let results = SearchHits {
        index: name.to_string(),
        query: query.to_string(),
        duration_ms: start_time.elapsed().as_millis() as u64,
        hits: hits
            .iter()
            .map(|(record, score)| SearchHit::from_record(record, *score))
            .collect(),
    };

    print!("{}", formatter.format_search_hits(&results));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_expand_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("skip.log"), "b").unwrap();
        let single = dir.path().join("a.txt").to_string_lossy().to_string();

        let sources = vec![
            dir.path().to_string_lossy().to_string(),
            "https://example.com/page?x=1".to_string(),
            single.clone(),
        ];
        let expanded = expand_sources(&sources, &["*.log".to_string()], &[]).unwrap();
        assert_eq!(
            expanded,
            vec![
                single.clone(),
                "https://example.com/page?x=1".to_string(),
                single
            ]
        );
    }
}
