//! Snapshot Agent - Main entry point
//!
//! Runs one snapshot described by a TOML job file.

use anyhow::Result;
use clap::Parser;
use snapshot_agent::{catalog::FixtureCatalog, config::Config, daemon::shutdown::ShutdownCoordinator, utils};
use snapshot_agent::{SnapshotExecutor, SnapshotJob};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the job configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Snapshot destination (overrides config)
    #[arg(short, long, value_name = "DIR")]
    destination: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)?;

    // Initialize logging
    let mut log_config = config.log.clone();
    if let Some(level) = args.log_level {
        log_config.level = level;
    }
    utils::logger::init(&log_config)?;

    tracing::info!(
        "Starting snapshot-agent v{} (config: {})",
        env!("CARGO_PKG_VERSION"),
        args.config.display()
    );

    let mut job: SnapshotJob = config.load_job()?;
    if let Some(destination) = args.destination {
        job.destination = destination;
    }
    let encryption = config.load_encryption()?;
    let catalog = Arc::new(FixtureCatalog::from_file(&config.catalog.fixture)?);

    // Signals cancel the run; the executor then discards its staging tree.
    let shutdown_coordinator = ShutdownCoordinator::new();
    let cancel_token = shutdown_coordinator.token();
    let signal_task = tokio::spawn(async move {
        shutdown_coordinator.wait_for_signal().await;
    });

    let executor = SnapshotExecutor::new(catalog.clone(), catalog, encryption, config.pipeline_options())
        .with_cancel(cancel_token);

    let outcome = executor.execute(&job).await;
    signal_task.abort();

    match outcome {
        Ok(result) if result.skipped_existing => {
            tracing::info!("Snapshot {} already exists, skipped", result.destination.display());
            Ok(())
        }
        Ok(result) => {
            tracing::info!(
                "Snapshot written to {}: {} objects ({} files), {} skipped, {} filter(s), {}s",
                result.destination.display(),
                result.objects_written,
                result.files_written,
                result.objects_skipped,
                result.filters.len(),
                result.duration_secs
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Snapshot failed: {}", e);
            Err(e.into())
        }
    }
}
