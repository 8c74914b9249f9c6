//! Skraper main entry point
//!
//! This is the command-line interface for the Skraper crawling engine.

use clap::Parser;
use skraper::config::{load_config_with_hash, Config, CrawlConfig};
use skraper::crawler::{CrawlerExecutor, ReqwestHttpClient, SelectorCrawler};
use skraper::output::{print_result, write_markdown_report};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Capacity of the channel between the crawl and the item printer
const ITEM_BUFFER: usize = 256;

/// Skraper: a concurrent, selector-driven web crawler
///
/// Skraper starts from a seed page, extracts the text of every element
/// matching the configured item selector and follows the configured
/// next-page link until no work remains.
#[derive(Parser, Debug)]
#[command(name = "skraper")]
#[command(version)]
#[command(about = "A concurrent, selector-driven web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URL, overriding `crawl.seed` from the configuration
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let crawl = resolve_crawl(&config, cli.seed)?;

    if cli.dry_run {
        handle_dry_run(&config, &crawl)
    } else {
        handle_crawl(&config, &crawl).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("skraper=info,warn"),
            1 => EnvFilter::new("skraper=debug,info"),
            2 => EnvFilter::new("skraper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Combines the `[crawl]` section with the command-line seed override
fn resolve_crawl(
    config: &Config,
    seed: Option<String>,
) -> Result<CrawlConfig, Box<dyn std::error::Error>> {
    let mut crawl = config
        .crawl
        .clone()
        .ok_or("configuration has no [crawl] section")?;

    if let Some(seed) = seed {
        skraper::url::crawl_host(&seed)?;
        crawl.seed = seed;
    }

    Ok(crawl)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, crawl: &CrawlConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Skraper Dry Run ===\n");

    println!("Executor Configuration:");
    println!("  Concurrency: {}", config.executor.concurrency);
    println!("  Poll interval: {}ms", config.executor.poll_interval_ms);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nHTTP:");
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Connect timeout: {}s", config.http.connect_timeout_secs);

    println!("\nCrawl:");
    println!("  Seed: {}", crawl.seed);
    println!("  Host: {}", skraper::url::crawl_host(&crawl.seed)?);
    println!("  Item selector: {}", crawl.item_selector);
    match &crawl.next_selector {
        Some(next) => println!("  Next selector: {}", next),
        None => println!("  Next selector: (none, single page)"),
    }
    if let Some(report) = &crawl.report_path {
        println!("  Report: {}", report);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, crawl: &CrawlConfig) -> Result<(), Box<dyn std::error::Error>> {
    let http = ReqwestHttpClient::from_config(&config.user_agent, &config.http)?;
    let executor = CrawlerExecutor::from_config(&config.executor, Arc::new(http));
    let crawler = SelectorCrawler::new(&crawl.item_selector, crawl.next_selector.as_deref())?;

    let (items_tx, mut items_rx) = mpsc::channel::<String>(ITEM_BUFFER);
    executor.register_sink(items_tx);

    let printer = tokio::spawn(async move {
        let mut printed = 0u64;
        while let Some(item) = items_rx.recv().await {
            println!("{}", item);
            printed += 1;
        }
        printed
    });

    let result = match executor.start(&crawl.seed, Arc::new(crawler)).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    // Sinks are closed once the crawl ends, so the printer drains and exits
    let printed = printer.await?;
    tracing::debug!("Printed {} items", printed);

    print_result(&result);

    if let Some(report_path) = &crawl.report_path {
        write_markdown_report(&result, &crawl.seed, Path::new(report_path))?;
        println!("\n✓ Report written to: {}", report_path);
    }

    Ok(())
}
