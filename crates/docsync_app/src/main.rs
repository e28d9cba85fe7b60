//! `docsync` command line: argument parsing and dispatch into the sync engine.

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use engine_logging::LogDestination;
use log::LevelFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "docsync")]
#[command(version)]
#[command(about = "Keep local markdown copies of provider documentation in sync", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "docsync.ron")]
    config: PathBuf,

    /// Also write the log to this file.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every configured page of the given providers (all when none are named)
    Sync { providers: Vec<String> },

    /// Fetch one page and record it under a provider (its host must be allowed)
    Fetch {
        provider: String,
        url: String,

        #[arg(long, default_value = "")]
        category: String,
    },

    /// Search titles, descriptions and topics
    Search {
        #[arg(default_value = "")]
        query: String,

        #[arg(short, long)]
        provider: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Print the matching documents as JSON
        #[arg(long)]
        json: bool,
    },

    /// List providers present in the manifest
    Providers,

    /// List categories present in the manifest
    Categories,

    /// Drop documents of a provider whose url is no longer configured
    Prune { provider: String },

    /// Upgrade an older manifest to the current schema
    Migrate,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match cli.log_file {
        Some(path) => LogDestination::Both(path),
        None => LogDestination::Terminal,
    };
    engine_logging::initialize(destination, level);

    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Sync { providers } => commands::sync(&config, &providers).await,
        Commands::Fetch {
            provider,
            url,
            category,
        } => commands::fetch(&config, &provider, &url, &category).await,
        Commands::Search {
            query,
            provider,
            category,
            json,
        } => commands::search(&config, &query, provider, category, json),
        Commands::Providers => commands::providers(&config),
        Commands::Categories => commands::categories(&config),
        Commands::Prune { provider } => commands::prune(&config, &provider),
        Commands::Migrate => commands::migrate(&config),
    }
}
