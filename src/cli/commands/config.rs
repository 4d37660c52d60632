use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat, VectorDriver};

const MASK: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration, environment overrides applied")]
    Show,
    #[command(about = "Show configuration file path")]
    Path,
    #[command(about = "Switch the vector store backend (memory or qdrant)")]
    SetDriver {
        #[arg(required = true)]
        driver: VectorDriver,
    },
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => handle_init(force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(),
        ConfigCommand::SetDriver { driver } => handle_set_driver(driver, formatter.as_ref()),
    }
}

fn handle_init(force: bool, formatter: &dyn Formatter) -> Result<()> {
    let config_path =
        Config::config_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    Config::default().save().context("failed to write config")?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", config_path.display()))
    );
    Ok(())
}

/// Copy of `config` safe to print.
fn masked(config: &Config) -> Config {
    let mut config = config.clone();
    for key in [
        &mut config.llm.api_key,
        &mut config.embedding.api_key,
        &mut config.vector_store.api_key,
    ] {
        if key.is_some() {
            *key = Some(MASK.to_string());
        }
    }
    config
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let config = masked(&Config::load()?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Some(path) = Config::config_path() {
        let state = if path.exists() { "" } else { " (not created, defaults)" };
        println!("# Config: {}{}", path.display(), state);
        println!();
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path() -> Result<()> {
    let path =
        Config::config_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if path.exists() {
        println!("Config (active): {}", path.display());
    } else {
        println!("Config (would be): {}", path.display());
    }

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        }
    }
    Ok(())
}

fn handle_set_driver(driver: VectorDriver, formatter: &dyn Formatter) -> Result<()> {
    let mut config = Config::load()?;
    let previous = config.vector_store.driver;
    config.vector_store.driver = driver;
    config.save().context("failed to write config")?;

    println!(
        "{}",
        formatter.format_message(&format!("Vector store driver: {} -> {}", previous, driver))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_keys() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        config.vector_store.api_key = Some("qd-secret".to_string());

        let shown = masked(&config);
        assert_eq!(shown.llm.api_key.as_deref(), Some(MASK));
        assert_eq!(shown.vector_store.api_key.as_deref(), Some(MASK));
        assert!(shown.embedding.api_key.is_none());
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-secret"));
    }
}
