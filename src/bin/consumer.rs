//! Ripple-Queue consumer
//!
//! Runs a pool of crawl workers against the frontier until the idle timeout
//! elapses or Ctrl-C is pressed. A first Ctrl-C lets in-flight pages finish;
//! a second one aborts them and returns their tasks to the queue.

use anyhow::Context;
use clap::Parser;
use ripple_queue::config::resolve_config;
use ripple_queue::crawler::{HttpFetcher, Supervisor};
use ripple_queue::frontier::{AmqpFrontier, Frontier};
use ripple_queue::logging::init_logging;
use ripple_queue::visited::open_visited_set;
use ripple_queue::VisitState;
use std::path::PathBuf;
use std::sync::Arc;

/// Crawl URLs from the frontier
#[derive(Parser, Debug)]
#[command(name = "ripple-consumer", version)]
#[command(about = "Crawl pages from the frontier and publish their links", long_about = None)]
struct Cli {
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

    let frontier = Arc::new(
        AmqpFrontier::connect(&config.queue)
            .await
            .context("Failed to connect to the queue")?,
    );
    let visited = open_visited_set(&config.visited).context("Failed to open the visited set")?;
    let fetcher = Arc::new(HttpFetcher::new(&config.crawler.user_agent)?);

    let supervisor = Supervisor::new(&config.crawler, frontier.clone(), visited.clone(), fetcher);

    let shutdown = supervisor.shutdown_token();
    let abort = supervisor.abort_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Interrupt received; finishing in-flight pages (Ctrl-C again to abort)");
        shutdown.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt; aborting in-flight fetches");
            abort.cancel();
        }
    });

    tracing::info!(
        "Consuming from '{}' on {}:{}",
        config.queue.name,
        config.queue.host,
        config.queue.port
    );
    let result = supervisor.run().await;

    if let Err(e) = frontier.close().await {
        tracing::warn!("Failed to close the queue connection cleanly: {}", e);
    }

    let stats = result.context("Crawl failed")?;
    tracing::info!("Crawl complete: {}", stats);

    for state in VisitState::all_states() {
        let count = visited.count_by_state(state).await?;
        if count > 0 {
            tracing::info!("  {}: {}", state, count);
        }
    }

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
