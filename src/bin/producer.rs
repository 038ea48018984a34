//! Ripple-Queue producer
//!
//! Seeds the frontier with a single URL at depth 0.

use anyhow::Context;
use clap::Parser;
use ripple_queue::config::resolve_config;
use ripple_queue::frontier::{AmqpFrontier, CrawlTask, Frontier};
use ripple_queue::logging::init_logging;
use ripple_queue::normalize_url;
use std::path::PathBuf;

/// Seed the crawl frontier with a URL
#[derive(Parser, Debug)]
#[command(name = "ripple-producer", version)]
#[command(about = "Publish a seed URL to the crawl frontier", long_about = None)]
struct Cli {
    /// Absolute http(s) URL to start crawling from
    #[arg(value_name = "URL")]
    url: String,

    /// Path to a TOML configuration file (defaults to environment variables)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_cli();
    init_logging(cli.verbose, cli.quiet);

    let config = resolve_config(cli.config.as_deref())?;
    let seed = normalize_url(&cli.url).with_context(|| format!("Invalid seed URL '{}'", cli.url))?;

    let frontier = AmqpFrontier::connect(&config.queue)
        .await
        .context("Failed to connect to the queue")?;
    let task = CrawlTask::seed(seed);
    frontier
        .push(&task)
        .await
        .with_context(|| format!("Failed to publish {}", task.url))?;
    frontier.close().await?;

    tracing::info!("Seeded {} into queue '{}'", task.url, config.queue.name);
    Ok(())
}

/// Parses arguments, exiting with status 1 on usage errors
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    }
}
