//! Crawl-Ingest main entry point
//!
//! This is the command-line interface for the crawl-to-warehouse pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use crawl_ingest::config::{load_config_with_hash, Config, WarehouseBackend};
use crawl_ingest::crawler::run_crawl;
use crawl_ingest::output::print_summary;
use crawl_ingest::url::ScopeRule;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Crawl-Ingest: crawl a site and stream one warehouse row per page
///
/// Starting from a seed URL, Crawl-Ingest follows links inside the
/// configured domain, records each page's cookies, title, description and
/// status, and appends the rows to a day-partitioned warehouse table.
#[derive(Parser, Debug)]
#[command(name = "crawl-ingest")]
#[command(version)]
#[command(about = "Crawl a site into a warehouse table", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the crawl plan without provisioning or fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).with_context(|| format!("Invalid configuration {}", cli.config.display()));
        }
    };
    tracing::info!("Configuration validated successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_crawl(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_ingest=info,warn"),
            1 => EnvFilter::new("crawl_ingest=debug,info"),
            2 => EnvFilter::new("crawl_ingest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &Config) -> Result<()> {
    let scope = ScopeRule::new(&config.domain, config.base_path.as_deref())
        .context("Invalid scope domain")?;

    println!("=== Crawl-Ingest Dry Run ===\n");

    println!("Crawl:");
    println!("  Start URL: {}", config.start_url);
    println!("  Scope: {}", scope);
    println!("  Skip external: {}", config.skip_external);
    println!("  Cookies only: {}", config.cookies_only);

    println!("\nFetcher:");
    println!(
        "  Max concurrent pages: {}",
        config.fetcher.max_concurrent_pages
    );
    println!(
        "  Request timeout: {}s",
        config.fetcher.request_timeout_secs
    );
    println!("  Max redirects: {}", config.fetcher.max_redirects);
    println!("  User agent: {}", config.fetcher.user_agent);
    match config.fetcher.crawl_timeout_secs {
        Some(secs) => println!("  Crawl deadline: {}s", secs),
        None => println!("  Crawl deadline: none"),
    }

    let warehouse = &config.warehouse;
    println!("\nWarehouse:");
    match warehouse.backend {
        WarehouseBackend::Bigquery => {
            println!("  Backend: BigQuery");
            println!(
                "  Project: {}",
                warehouse.project_id.as_deref().unwrap_or("-")
            );
            println!("  Token variable: {}", warehouse.access_token_env);
        }
        WarehouseBackend::Sqlite => {
            println!("  Backend: SQLite");
            println!(
                "  Database: {}",
                warehouse.database_path.as_deref().unwrap_or("-")
            );
        }
    }
    println!(
        "  Table: {}.{} (partitioned by day)",
        warehouse.dataset_id, warehouse.table_id
    );

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> Result<()> {
    tracing::info!(
        "Crawling {} within {} (skip external: {})",
        config.start_url,
        config.domain,
        config.skip_external
    );

    match run_crawl(config).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
