//! Binary entry point for mediaflow.
//!
//! Drives the download, analysis, history and storage operations from the
//! command line.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mediaflow::config::MediaflowConfig;
use mediaflow::history::{history_stats, render_history, render_stats};
use mediaflow::observability::{self, ObservabilityConfig};
use mediaflow::resources::SystemResourceMonitor;
use mediaflow::services::{AnalysisDispatcher, DownloadService};
use mediaflow::storage::{StorageConfig, StorageManager};
use mediaflow::{Category, FilesystemHistoryStore, HistoryStore, OwnerId};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Mediaflow - resource-aware media download, analysis and storage.
#[derive(Parser)]
#[command(name = "mediaflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "MEDIAFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Download one or more URLs into managed storage.
    Fetch {
        /// URLs to download.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Owner identity for history.
        #[arg(short, long, default_value = "0")]
        owner: i64,
    },

    /// Run every analysis task on a local file.
    Analyze {
        /// File to analyze.
        path: PathBuf,

        /// Owner identity for history.
        #[arg(short, long, default_value = "0")]
        owner: i64,

        /// Also write the full report file.
        #[arg(long)]
        report: bool,
    },

    /// Show an owner's history.
    History {
        /// Owner identity.
        #[arg(short, long, default_value = "0")]
        owner: i64,

        /// Only records of this kind (video, audio, photo, qr, ...).
        #[arg(short, long)]
        kind: Option<String>,

        /// Maximum number of records, most recent kept.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show per-kind counts instead of records.
        #[arg(long)]
        stats: bool,
    },

    /// Delete an owner's history.
    HistoryClear {
        /// Owner identity.
        #[arg(short, long)]
        owner: i64,
    },

    /// Inspect or maintain managed storage.
    Storage {
        /// Storage subcommand.
        #[command(subcommand)]
        action: StorageAction,
    },

    /// Sample host CPU, memory and disk headroom.
    Resources,

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Storage subcommands.
#[derive(Subcommand)]
enum StorageAction {
    /// Show usage against the budget.
    Usage,
    /// List managed files, oldest first.
    List {
        /// Only files in this category.
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Evict oldest files until usage is within budget.
    Evict,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init(ObservabilityConfig::from_config(
        &config,
        cli.verbose,
    )) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: MediaflowConfig) -> anyhow::Result<()> {
    match command {
        Commands::Fetch { urls, owner } => cmd_fetch(&config, urls, OwnerId::new(owner)).await,
        Commands::Analyze {
            path,
            owner,
            report,
        } => cmd_analyze(&config, &path, OwnerId::new(owner), report).await,
        Commands::History {
            owner,
            kind,
            limit,
            stats,
        } => cmd_history(&config, OwnerId::new(owner), kind.as_deref(), limit, stats),
        Commands::HistoryClear { owner } => cmd_history_clear(&config, OwnerId::new(owner)),
        Commands::Storage { action } => cmd_storage(&config, action).await,
        Commands::Resources => cmd_resources(&config).await,
        Commands::Config { show } => cmd_config(&config, show),
    }
}

/// Loads configuration from an explicit path or the default location.
fn load_config(path: Option<&Path>) -> mediaflow::Result<MediaflowConfig> {
    match path {
        Some(path) => MediaflowConfig::load_from_file(path),
        None => MediaflowConfig::load_default(),
    }
}

fn history_store(config: &MediaflowConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    let store = FilesystemHistoryStore::new(config.history_dir())
        .context("opening history directory")?;
    Ok(Arc::new(store))
}

async fn cmd_fetch(config: &MediaflowConfig, urls: Vec<String>, owner: OwnerId) -> anyhow::Result<()> {
    let service = DownloadService::from_config(config).context("initializing downloads")?;
    let outcomes = service.fetch_many(&urls, owner).await;

    let mut failed = 0;
    for outcome in &outcomes {
        if outcome.is_success() {
            println!(
                "ok    {} -> {} ({} bytes, {}, {:.1}s)",
                outcome.locator,
                outcome
                    .local_path
                    .as_deref()
                    .map_or_else(String::new, |p| p.display().to_string()),
                outcome.bytes,
                outcome.strategy.map_or("-", |s| s.as_str()),
                outcome.elapsed.as_secs_f64()
            );
            for path in &outcome.secondary {
                println!("      + {}", path.display());
            }
        } else {
            failed += 1;
            println!("error {}: {}", outcome.locator, outcome.message);
        }
    }

    if failed > 0 {
        bail!("{failed} of {} downloads failed", outcomes.len());
    }
    Ok(())
}

async fn cmd_analyze(
    config: &MediaflowConfig,
    path: &Path,
    owner: OwnerId,
    report: bool,
) -> anyhow::Result<()> {
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    let dispatcher = AnalysisDispatcher::from_config(config, history_store(config)?)
        .context("initializing analysis")?;
    let summary = dispatcher.analyze(path, owner).await;

    println!("{}", summary.render());
    if report {
        let report_path = summary
            .write_report(&config.temp_dir())
            .await
            .context("writing report")?;
        println!();
        println!("Full report: {}", report_path.display());
    }
    Ok(())
}

fn cmd_history(
    config: &MediaflowConfig,
    owner: OwnerId,
    kind: Option<&str>,
    limit: Option<usize>,
    stats: bool,
) -> anyhow::Result<()> {
    let store = history_store(config)?;
    let records = store.query(owner, kind, limit).context("reading history")?;
    if stats {
        println!("{}", render_stats(&history_stats(&records)));
    } else {
        println!("{}", render_history(&records));
    }
    Ok(())
}

fn cmd_history_clear(config: &MediaflowConfig, owner: OwnerId) -> anyhow::Result<()> {
    let removed = history_store(config)?
        .clear(owner)
        .context("clearing history")?;
    println!("Removed {removed} record(s) for owner {owner}");
    Ok(())
}

async fn cmd_storage(config: &MediaflowConfig, action: StorageAction) -> anyhow::Result<()> {
    let storage = StorageManager::new(StorageConfig::from_config(config));
    match action {
        StorageAction::Usage => {
            let used = storage.total_usage_bytes().await?;
            let budget = storage.budget_bytes();
            println!("Storage root: {}", storage.root().display());
            println!("Used: {} of {} ({})", gib(used), gib(budget), percent(used, budget));
        },
        StorageAction::List { category } => {
            let category = match category.as_deref() {
                Some(name) => Some(
                    Category::parse(name)
                        .with_context(|| format!("unknown category '{name}'"))?,
                ),
                None => None,
            };
            let files = storage.list_files(category).await?;
            for file in &files {
                let modified: chrono::DateTime<chrono::Utc> = file.modified.into();
                println!(
                    "{:<6} {:>12}  {}  {}",
                    file.category.as_str(),
                    file.size,
                    modified.format("%Y-%m-%d %H:%M:%S"),
                    file.path.display()
                );
            }
            println!("{} file(s)", files.len());
        },
        StorageAction::Evict => {
            let result = storage.evict_if_over_budget().await?;
            println!("{}", result.summary());
        },
    }
    Ok(())
}

async fn cmd_resources(config: &MediaflowConfig) -> anyhow::Result<()> {
    let monitor = SystemResourceMonitor::new(config.downloads_dir());
    let snapshot = monitor.snapshot().await.context("sampling resources")?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    match snapshot.shortfall(&config.resources) {
        Some(reason) => println!("Below thresholds: {reason}"),
        None => println!("Within thresholds"),
    }
    Ok(())
}

fn cmd_config(config: &MediaflowConfig, show: bool) -> anyhow::Result<()> {
    if !show {
        println!("Use --show to display configuration");
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("Data Directory: {}", config.data_dir.display());
    println!("Storage Budget: {}", gib(config.storage.budget_bytes));
    println!("Temp File TTL: {}s", config.storage.temp_file_ttl.as_secs());
    println!();
    println!("Transfers:");
    println!("  Chunk Size: {} bytes", config.transfer.chunk_size);
    println!("  Chunked Threshold: {} bytes", config.transfer.chunked_threshold);
    println!("  Max File Size: {} bytes", config.transfer.max_file_size);
    println!("  Max Parallel: {}", config.transfer.max_parallel);
    println!("  Throttle Backoff: {}s", config.transfer.throttle_backoff.as_secs());
    println!();
    println!("Resource Thresholds:");
    println!("  Min CPU Free: {}%", config.resources.min_cpu_free_percent);
    println!("  Min Free Memory: {} MB", config.resources.min_free_memory_mb);
    println!("  Min Free Disk: {} MB", config.resources.min_free_disk_mb);
    println!();
    println!("Analysis:");
    println!("  Task Timeout: {}s", config.analysis.task_timeout.as_secs());
    println!("  Overall Timeout: {}s", config.analysis.overall_timeout.as_secs());
    println!("  Workers: {}", config.analysis.workers);
    println!("  Payload Chars: {}", config.analysis.payload_chars);
    println!("  Cache Capacity: {}", config.analysis.cache_capacity);
    println!(
        "  Objects Command: {}",
        config.analysis.objects_command.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Safety Command: {}",
        config.analysis.safety_command.as_deref().unwrap_or("(none)")
    );
    println!();
    println!("Feature Flags:");
    println!("  Secondary Derivations: {}", config.features.secondary_derivations);
    println!("  QR: {}", config.features.qr);
    println!("  OCR: {}", config.features.ocr);
    println!("  Objects: {}", config.features.objects);
    println!("  Safety: {}", config.features.safety);
    println!("  Metadata: {}", config.features.metadata);
    println!("  Strategy Fallback: {}", config.features.strategy_fallback);
    println!();
    println!("Metrics: {} (port {})", config.metrics.enabled, config.metrics.port);
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn gib(bytes: u64) -> String {
    format!("{:.2} GiB", bytes as f64 / f64::from(1u32 << 30))
}

#[allow(clippy::cast_precision_loss)]
fn percent(used: u64, budget: u64) -> String {
    if budget == 0 {
        return "n/a".to_string();
    }
    format!("{:.1}%", used as f64 * 100.0 / budget as f64)
}
