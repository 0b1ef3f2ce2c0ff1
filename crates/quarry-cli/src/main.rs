//! Quarry CLI
//!
//! Local-first hybrid search over your documents.

use anyhow::Result;
use clap::Parser;
use quarry_core::error::exit_codes;
use quarry_core::{Config, KnowledgeStore, QuarryError};

mod app;
mod commands;
mod output;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<QuarryError>()
            .map(QuarryError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.base_dir {
        config.base_dir = dir.clone();
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let store = KnowledgeStore::open(config).await?;

    match cli.command {
        Commands::Index(args) => commands::index::run(args, &store, cli.format).await,
        Commands::Remove(args) => commands::remove::run(args, &store, cli.format).await,
        Commands::Search(args) => commands::search::run(args, &store, cli.format).await,
        Commands::Get(args) => commands::get::run(args, &store, cli.format).await,
        Commands::Stats => commands::stats::run(&store, cli.format).await,
        Commands::Mirror => commands::mirror::run(&store, cli.format).await,
    }
}
