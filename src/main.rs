//! Wiki-Sync main entry point
//!
//! This is the command-line interface for the Wiki-Sync content synchronizer.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wiki_sync::config::{load_config_with_hash, Config, IndexKind};
use wiki_sync::output::{print_status, print_summary, write_report, ResultStatus, RunResult};
use wiki_sync::state::{CancellationFlag, CrawlStateTracker};
use wiki_sync::storage::{
    open_storage, DocumentStore, FsObjectStore, HttpDocumentStore, RunStatus, SqliteStorage,
};
use wiki_sync::SyncEngine;

/// Wiki-Sync: incremental wiki-to-knowledge-store synchronizer
///
/// Wiki-Sync enumerates the pages of configured wiki collections, relocates
/// embedded images to object storage, normalizes page markup into text and
/// upserts one document per page. Per-collection checkpoints make reruns
/// incremental and interrupted runs resumable.
#[derive(Parser, Debug)]
#[command(name = "wiki-sync")]
#[command(version)]
#[command(about = "Incremental wiki-to-knowledge-store synchronizer", long_about = None)]
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

    /// Validate config and list the pages that would be synced
    #[arg(long, conflicts_with = "status")]
    dry_run: bool,

    /// Show stored checkpoints and recent runs, then exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    status: bool,

    /// Clear the selected collections' checkpoints before syncing
    #[arg(long)]
    fresh: bool,

    /// Only sync this collection (repeatable); defaults to all configured
    #[arg(long = "collection", value_name = "KEY")]
    collections: Vec<String>,

    /// Write the run result as JSON to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let collections = select_collections(&config.source.collections, &cli.collections)?;
    let database_path = PathBuf::from(&config.index.database_path);
    let storage = Arc::new(
        open_storage(&database_path)
            .with_context(|| format!("failed to open {}", database_path.display()))?,
    );

    if cli.status {
        handle_status(&config, storage).await
    } else if cli.dry_run {
        handle_dry_run(Arc::new(config), storage, &collections).await
    } else {
        handle_sync(
            Arc::new(config),
            &config_hash,
            storage,
            &collections,
            cli.fresh,
            cli.report.as_deref(),
        )
        .await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wiki_sync=info,warn"),
            1 => EnvFilter::new("wiki_sync=debug,info"),
            2 => EnvFilter::new("wiki_sync=trace,debug"),
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

/// Restricts the run to the requested collections, all configured ones by default
///
/// Repeated keys are dropped so each collection gets a single worker.
fn select_collections(
    configured: &[String],
    requested: &[String],
) -> anyhow::Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(configured.to_vec());
    }

    let mut selected: Vec<String> = Vec::with_capacity(requested.len());
    for key in requested {
        if !configured.contains(key) {
            bail!("collection '{}' is not configured", key);
        }
        if !selected.contains(key) {
            selected.push(key.clone());
        }
    }
    Ok(selected)
}

fn build_document_store(
    config: &Config,
    storage: &Arc<SqliteStorage>,
) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.index.kind {
        IndexKind::Sqlite => {
            let store: Arc<dyn DocumentStore> = storage.clone();
            Ok(store)
        }
        IndexKind::Http => {
            let endpoint = config
                .index
                .endpoint
                .as_deref()
                .context("index.endpoint is required when kind = \"http\"")?;
            let token = config
                .index
                .endpoint_token_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok());
            let store = HttpDocumentStore::new(
                endpoint,
                token,
                Duration::from_secs(config.source.request_timeout),
            )?;
            let store: Arc<dyn DocumentStore> = Arc::new(store);
            Ok(store)
        }
    }
}

fn build_engine(
    config: Arc<Config>,
    storage: &Arc<SqliteStorage>,
    cancel: CancellationFlag,
) -> anyhow::Result<SyncEngine> {
    let documents = build_document_store(&config, storage)?;
    let objects = Arc::new(FsObjectStore::new(&config.storage.root));
    let engine = SyncEngine::from_config(config, objects, documents, storage.clone(), cancel)?;
    Ok(engine)
}

/// Handles the --status mode: shows checkpoints and run history
async fn handle_status(config: &Config, storage: Arc<SqliteStorage>) -> anyhow::Result<()> {
    println!("Database: {}\n", config.index.database_path);

    let tracker = CrawlStateTracker::new(storage.clone(), &config.checkpoint);
    let checkpoints = tracker.all_checkpoints().await?;
    let runs = storage.latest_runs(10)?;

    print_status(&checkpoints, &runs);
    Ok(())
}

/// Handles the --dry-run mode: shows what a sync would process
async fn handle_dry_run(
    config: Arc<Config>,
    storage: Arc<SqliteStorage>,
    collections: &[String],
) -> anyhow::Result<()> {
    println!("=== Wiki-Sync Dry Run ===\n");

    println!("Source:");
    println!("  Base URL: {}", config.source.base_url());
    println!("  Page size: {}", config.source.page_size);
    println!("\nStorage:");
    println!("  Attachments: {}", config.storage.attachments_uri);
    println!("  Storage class: {}", config.storage.storage_class.as_str());
    println!("\nIndex:");
    println!("  Kind: {:?}", config.index.kind);
    println!("  Source prefix: {}", config.index.source_prefix);
    println!();

    let engine = build_engine(config, &storage, CancellationFlag::new())?;
    for key in collections {
        let plan = engine
            .plan_collection(key)
            .await
            .with_context(|| format!("failed to plan collection {}", key))?;

        match plan.last_crawl {
            Some(since) => println!(
                "Collection {} ({} of {} pages changed since {}):",
                key,
                plan.pages.len(),
                plan.pages_found,
                since
            ),
            None => println!(
                "Collection {} (first sync, {} pages):",
                key, plan.pages_found
            ),
        }
        for page in &plan.pages {
            println!(
                "  - {} v{} {} ({})",
                page.id,
                page.version_number(),
                page.title,
                page.last_modified
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string())
            );
        }
        println!();
    }

    println!("✓ Configuration is valid");
    Ok(())
}

/// Handles the main sync operation
async fn handle_sync(
    config: Arc<Config>,
    config_hash: &str,
    storage: Arc<SqliteStorage>,
    collections: &[String],
    fresh: bool,
    report: Option<&Path>,
) -> anyhow::Result<()> {
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; stopping at the next page boundary");
                cancel.cancel();
            }
        });
    }

    let run_id = storage.create_run(config_hash)?;
    let started_at = Utc::now();

    let result = match build_engine(config, &storage, cancel) {
        Ok(engine) => match reset_if_fresh(&engine, collections, fresh).await {
            Ok(()) => engine.run(collections).await,
            Err(e) => RunResult::failed(started_at, format!("{:#}", e)),
        },
        Err(e) => RunResult::failed(started_at, format!("{:#}", e)),
    };

    let run_status = match result.status {
        ResultStatus::Completed => RunStatus::Completed,
        ResultStatus::Interrupted => RunStatus::Interrupted,
        ResultStatus::Error => RunStatus::Failed,
    };
    let summary = serde_json::to_string(&result)?;
    storage.complete_run(run_id, run_status, Some(&summary))?;

    print_summary(&result);
    if let Some(path) = report {
        write_report(&result, path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        println!("✓ Report written to: {}", path.display());
    }

    if result.status == ResultStatus::Error {
        bail!("sync finished with errors");
    }
    Ok(())
}

async fn reset_if_fresh(
    engine: &SyncEngine,
    collections: &[String],
    fresh: bool,
) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh sync (ignoring stored checkpoints)");
        engine.reset(collections).await?;
    }
    Ok(())
}
