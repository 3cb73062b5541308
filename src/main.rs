//! Clipvault - creator media storage client
//!
//! Uploads assets through the strategy chain and reconciles the local index
//! with the remote store. Results print as JSON on stdout; logs go to stderr.

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use clipvault::config::Settings;
use clipvault::sync::{JsonFileIndex, SyncOptions, SyncProgress, SyncStrategy};
use clipvault::{logging, metrics, StorageService};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

const DEFAULT_INDEX: &str = "clipvault-index.json";

/// Clipvault - resilient S3-compatible storage and index reconciliation
#[derive(Parser, Debug)]
#[command(name = "clipvault")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to settings file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file through the strategy chain
    Upload {
        /// File to upload
        file: PathBuf,

        /// Destination object key
        #[arg(short, long)]
        key: String,

        /// Content type
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },

    /// Reconcile the local index for one owner
    Sync {
        /// Owner whose namespace is reconciled
        #[arg(short, long)]
        owner: String,

        #[arg(short, long, value_enum, default_value_t = StrategyArg::Auto)]
        strategy: StrategyArg,

        /// Compute and report without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Index remote objects that have no local record
        #[arg(long)]
        add_missing: bool,

        /// Drop local records whose object is gone
        #[arg(long)]
        remove_orphaned: bool,

        /// Delete remote objects that have no local record (ignored with --add-missing)
        #[arg(long)]
        cleanup_orphans: bool,

        /// Local index file
        #[arg(long, default_value = DEFAULT_INDEX)]
        index: PathBuf,
    },

    /// Probe the store with a one-key listing
    Health,

    /// List remote objects
    List {
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Auto,
    Fast,
    Full,
    Repair,
}

impl StrategyArg {
    fn into_strategy(self) -> Option<SyncStrategy> {
        match self {
            Self::Auto => None,
            Self::Fast => Some(SyncStrategy::Fast),
            Self::Full => Some(SyncStrategy::Full),
            Self::Repair => Some(SyncStrategy::Repair),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let settings = Settings::load_or_default(args.config.as_ref())
        .with_context(|| format!("failed to load settings from {:?}", args.config))?;

    logging::init_subscriber(&settings.logging, args.log_level.as_deref())?;
    metrics::set_enabled(settings.metrics.enabled || args.metrics);

    info!("Starting Clipvault v{}", clipvault::VERSION);

    let code = run(args.command, settings).await?;

    if args.metrics {
        eprint!("{}", metrics::gather_text());
    }
    Ok(code)
}

async fn run(command: Command, settings: Settings) -> anyhow::Result<ExitCode> {
    match command {
        Command::Upload {
            file,
            key,
            content_type,
        } => {
            let body = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let service =
                StorageService::from_env(settings, Arc::new(JsonFileIndex::new(DEFAULT_INDEX)));
            let result = service.upload(Bytes::from(body), &key, &content_type).await?;
            print_json(&result)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Sync {
            owner,
            strategy,
            dry_run,
            add_missing,
            remove_orphaned,
            cleanup_orphans,
            index,
        } => {
            let service = StorageService::from_env(settings, Arc::new(JsonFileIndex::new(index)));

            // Explicit action flags replace the strategy's defaults
            let explicit = add_missing || remove_orphaned || cleanup_orphans;
            let report = match (explicit, strategy.into_strategy()) {
                (true, strategy) => {
                    let options = SyncOptions {
                        add_missing,
                        remove_orphaned,
                        cleanup_orphans,
                        ..SyncOptions::default()
                    };
                    let options = with_progress_log(options.dry_run(dry_run));
                    service.run_sync(&owner, strategy, Some(options)).await?
                }
                (false, Some(strategy)) => {
                    let options = strategy.default_options().dry_run(dry_run);
                    service
                        .run_sync(&owner, Some(strategy), Some(with_progress_log(options)))
                        .await?
                }
                (false, None) => {
                    let decision = service.smart_sync(&owner).await?;
                    let options = decision.strategy.default_options().dry_run(dry_run);
                    let mut report = service
                        .run_sync(&owner, Some(decision.strategy), Some(with_progress_log(options)))
                        .await?;
                    report.recommendation = Some(decision.recommendation);
                    report
                }
            };

            print_json(&report)?;
            Ok(if report.progress.errors.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }

        Command::Health => {
            let service =
                StorageService::from_env(settings, Arc::new(JsonFileIndex::new(DEFAULT_INDEX)));
            let report = service.health().await;
            print_json(&report)?;
            Ok(if report.healthy {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::List { prefix } => {
            let service =
                StorageService::from_env(settings, Arc::new(JsonFileIndex::new(DEFAULT_INDEX)));
            let listing = service.list_objects(prefix.as_deref()).await?;
            print_json(&listing)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn with_progress_log(options: SyncOptions) -> SyncOptions {
    options.with_progress(|progress: &SyncProgress| {
        tracing::debug!(
            phase = ?progress.phase,
            current = ?progress.current_file,
            processed = progress.processed_files,
            total = progress.total_files,
            "Sync progress"
        );
    })
}
