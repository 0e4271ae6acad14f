//! Tandem - headless driver for the client core.

mod cli;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use tandem::config::{AppConfig, init_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    tandem::logger::set_verbose(cli.verbose);

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_config(config);

    match cli.command {
        Commands::Run { page } => cli::run::run(page.as_deref()).await,
        Commands::State { action } => cli::state::state(action),
        Commands::Cache { action } => cli::cache::cache(action),
    }
}
