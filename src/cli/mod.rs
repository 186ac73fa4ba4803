//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod catalog_cmd;
mod harvest_cmd;
mod icons;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::HarvestConfig;

/// Output encoding for harvested records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One pretty-printed JSON array
    #[default]
    Json,
    /// One JSON record per line
    Ndjson,
    /// Records plus per-category outcomes
    Report,
}

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Headless catalog harvester for grocery storefronts")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the configured categories and print the harvested products
    Run {
        /// Keep products whose name contains this text, or whose barcode equals it
        #[arg(short, long)]
        query: Option<String>,
        /// Return at most this many products
        #[arg(short, long)]
        limit: Option<usize>,
        /// Total scroll iterations across the catalog
        #[arg(long)]
        max_scrolls: Option<u32>,
        /// Visit at most this many categories (0 = all)
        #[arg(long)]
        max_categories: Option<usize>,
        /// Keep products without a positive price
        #[arg(long)]
        no_price_filter: bool,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// List the configured categories in crawl order
    Categories,

    /// Print the effective configuration as JSON
    Config,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            HarvestConfig::load_from_path(path)
                .await
                .map_err(|e| anyhow::anyhow!(e))?
        }
        None => HarvestConfig::load().await,
    };

    match cli.command {
        Commands::Run {
            query,
            limit,
            max_scrolls,
            max_categories,
            no_price_filter,
            headed,
            output,
            format,
        } => {
            let mut config = config;
            if let Some(max) = max_categories {
                config.store.max_categories = max;
            }
            if headed {
                config.browser.headless = false;
            }
            let args = harvest_cmd::RunArgs {
                query,
                limit,
                max_scrolls,
                require_price: !no_price_filter,
                output,
                format,
            };
            harvest_cmd::cmd_run(config, args).await
        }
        Commands::Categories => catalog_cmd::cmd_categories(&config),
        Commands::Config => catalog_cmd::cmd_config(&config),
    }
}
