//! News Engine main entry point
//!
//! This is the command-line interface for the News Engine crawler and
//! pipeline workers.

use anyhow::{bail, Context};
use clap::Parser;
use news_engine::config::{load_config_with_hash, Config};
use news_engine::crawler::FetchSession;
use news_engine::pipeline::tasks::START_CRAWLER_TASK;
use news_engine::pipeline::{
    spawn_scheduler, InMemoryBroker, InMemoryTaskRegistry, Pipeline, TaskStatus, WorkerPool,
};
use news_engine::plugins::discover_feed_urls;
use news_engine::storage::open_store;
use serde_json::{json, Map};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// News Engine: a pluggable news crawler and processing pipeline
///
/// News Engine crawls configured news sources through per-source extraction
/// plugins and moves the articles through the crawl, process and index
/// stages.
#[derive(Parser, Debug)]
#[command(name = "news-engine")]
#[command(version = "1.0.0")]
#[command(about = "A pluggable news crawler and processing pipeline", long_about = None)]
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

    /// Validate config and show the configured sources without running anything
    #[arg(long, conflicts_with_all = ["crawl", "discover", "sources"])]
    dry_run: bool,

    /// Crawl one source now, run the follow-up stages and print the crawl result
    #[arg(long, value_name = "SOURCE_ID", conflicts_with_all = ["dry_run", "discover", "sources"])]
    crawl: Option<String>,

    /// Print the feed URLs a page advertises
    #[arg(long, value_name = "URL", conflicts_with_all = ["dry_run", "crawl", "sources"])]
    discover: Option<String>,

    /// List stored sources with their last crawl time
    #[arg(long, conflicts_with_all = ["dry_run", "crawl", "discover"])]
    sources: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.sources {
        handle_sources(config)?;
    } else if let Some(source_id) = cli.crawl {
        handle_crawl(config, &source_id).await?;
    } else if let Some(url) = cli.discover {
        handle_discover(&config, &url).await?;
    } else {
        handle_run(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("news_engine=info,warn"),
            1 => EnvFilter::new("news_engine=debug,info"),
            2 => EnvFilter::new("news_engine=trace,debug"),
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

fn build_pipeline(config: Config) -> anyhow::Result<Arc<Pipeline>> {
    let store = open_store(&config.storage).context("Failed to open storage")?;
    let pipeline = Pipeline::new(
        config,
        store,
        Arc::new(InMemoryBroker::new()),
        Arc::new(InMemoryTaskRegistry::new()),
    );
    pipeline.seed_sources()?;
    Ok(Arc::new(pipeline))
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== News Engine Dry Run ===\n");

    println!("Crawler:");
    println!("  Delay: {}ms", config.crawler.delay_ms);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  User agents: {}", config.crawler.user_agents.len());
    if let Some(proxy) = &config.crawler.proxy {
        println!("  Proxy: {}", proxy);
    }

    println!("\nWorkers:");
    println!("  Consumers per queue: {}", config.worker.concurrency);
    println!("  Max in flight: {}", config.worker.max_in_flight);

    println!("\nPipeline:");
    println!("  Batch size: {}", config.pipeline.batch_size);
    println!("  Chain stages: {}", config.pipeline.chain_stages);

    println!("\nSchedule:");
    println!("  Crawl sweep: every {}s", config.schedule.crawl_interval_secs);
    println!("  Process sweep: every {}s", config.schedule.process_interval_secs);
    println!("  Index sweep: every {}s", config.schedule.index_interval_secs);

    println!("\nStorage:");
    match &config.storage.database_path {
        Some(path) => println!("  Database: {}", path),
        None => println!("  In memory"),
    }

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        println!(
            "  - {} [{}] {} ({}, plugin {}, every {}s{})",
            source.id,
            source.kind,
            source.url,
            source.name,
            source.plugin,
            source.crawl_interval_secs,
            if source.active { "" } else { ", inactive" }
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --sources mode: lists stored sources
fn handle_sources(config: Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let sources = pipeline.store().list_sources()?;

    println!("Sources ({}):", sources.len());
    for source in sources {
        let last_crawl = source
            .last_crawl_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<20} {:<8} {:<8} last crawl: {}",
            source.id,
            source.plugin,
            if source.active { "active" } else { "inactive" },
            last_crawl
        );
    }

    Ok(())
}

/// Handles the --crawl mode: runs one crawl and its follow-up stages inline
async fn handle_crawl(config: Config, source_id: &str) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    if pipeline.store().get_source(source_id)?.is_none() {
        bail!("Unknown source: {}", source_id);
    }

    let task_id = pipeline.router().dispatch(
        START_CRAWLER_TASK,
        vec![json!(source_id), json!(null), json!(true)],
        Map::new(),
    )?;
    let handled = pipeline.drain().await?;
    tracing::info!(tasks = handled, "Pipeline drained");

    let record = pipeline.registry().get(&task_id)?;
    if record.status == TaskStatus::Failed {
        bail!(
            "Crawl of {} failed: {}",
            source_id,
            record.error.unwrap_or_default()
        );
    }

    let result = record.result.unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Handles the --discover mode: prints feed links advertised by a page
async fn handle_discover(config: &Config, url: &str) -> anyhow::Result<()> {
    let url = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    let session = FetchSession::new(&config.crawler)?;

    let attempt = session.fetch(&url).await;
    session.close();
    let page = match attempt.outcome {
        Ok(page) => page,
        Err(failure) => bail!(
            "Failed to fetch {} after {} retries: {}",
            failure.url,
            failure.retries,
            failure.error
        ),
    };

    let feeds = discover_feed_urls(&page.body, &page.url);
    if feeds.is_empty() {
        println!("No feeds advertised by {}", page.url);
    }
    for feed in feeds {
        println!("{}", feed);
    }
    Ok(())
}

/// Handles the default mode: runs workers and the scheduler until Ctrl-C
async fn handle_run(config: Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;

    let pool = WorkerPool::start(Arc::clone(&pipeline), &pipeline.config().worker);
    let timers = spawn_scheduler(
        pipeline.router().clone(),
        &pipeline.config().schedule,
        pool.shutdown_signal(),
    );
    tracing::info!(workers = pool.size(), "News Engine running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    pool.shutdown().await;
    for timer in timers {
        if let Err(e) = timer.await {
            tracing::error!(error = %e, "Scheduler ended abnormally");
        }
    }

    if let Ok(counts) = pipeline.store().count_by_status() {
        for (status, count) in counts {
            tracing::info!(%status, count, "Articles");
        }
    }

    Ok(())
}
