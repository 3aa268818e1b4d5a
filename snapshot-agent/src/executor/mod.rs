//! Snapshot executor - orchestrates one snapshot run.
//!
//! `Init -> EnsureLayout -> for each filter { Resolve -> for each type
//! { Select -> for each object { Classify -> Protect -> Persist } } }
//! -> WriteRealizedFilters -> Publish`
//!
//! Filters run in template order. Resource types of one filter are captured
//! concurrently, bounded by `concurrency`; objects of a type are handled one
//! at a time. Any failure or cancellation aborts the run and discards the
//! staging tree.

pub mod capture;

use crate::catalog::{Discovery, ObjectLister};
use crate::encryption::EncryptionBinding;
use crate::model::{BackupTemplate, Filter};
use crate::resolver::{ExclusionSet, FilterResolver};
use crate::selector::ObjectSelector;
use crate::utils::errors::{Result, SnapshotError};
use crate::writer::{Publication, SnapshotWriter};
use capture::{capture_resource, CaptureContext, CaptureStats};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Default number of resource types captured in parallel.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// One triggered snapshot run
#[derive(Debug, Clone)]
pub struct SnapshotJob {
    pub destination: PathBuf,
    pub template: BackupTemplate,
}

/// Tuning shared by every run of an executor
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub concurrency: usize,
    /// Deadline for each discovery and list call
    pub call_timeout: Option<Duration>,
    pub exclusions: ExclusionSet,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            call_timeout: Some(Duration::from_secs(60)),
            exclusions: ExclusionSet::default(),
        }
    }
}

/// Snapshot execution result
#[derive(Debug)]
pub struct SnapshotResult {
    pub destination: PathBuf,
    /// The destination already held a snapshot; nothing was done
    pub skipped_existing: bool,
    /// Realized filters as written to `filters.json`
    pub filters: Vec<Filter>,
    pub objects_written: usize,
    pub objects_skipped: usize,
    pub files_written: usize,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
}

impl SnapshotResult {
    /// A run that found its destination already published.
    fn skipped(destination: PathBuf, started_at: DateTime<Utc>, duration_secs: u64) -> Self {
        Self {
            destination,
            skipped_existing: true,
            filters: Vec::new(),
            objects_written: 0,
            objects_skipped: 0,
            files_written: 0,
            started_at,
            duration_secs,
        }
    }
}

/// Main snapshot executor
pub struct SnapshotExecutor {
    resolver: FilterResolver,
    selector: ObjectSelector,
    encryption: EncryptionBinding,
    concurrency: usize,
    cancel_token: CancellationToken,
}

impl SnapshotExecutor {
    /// Create a new executor (no external cancellation)
    pub fn new(
        discovery: Arc<dyn Discovery>,
        lister: Arc<dyn ObjectLister>,
        encryption: EncryptionBinding,
        options: PipelineOptions,
    ) -> Self {
        let mut resolver = FilterResolver::new(discovery, options.exclusions);
        let mut selector = ObjectSelector::new(lister);
        if let Some(limit) = options.call_timeout {
            resolver = resolver.with_call_timeout(limit);
            selector = selector.with_call_timeout(limit);
        }
        Self {
            resolver,
            selector,
            encryption,
            concurrency: options.concurrency.max(1),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token, e.g. one fired when the trigger is superseded
    pub fn with_cancel(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// Execute a snapshot job
    pub async fn execute(&self, job: &SnapshotJob) -> Result<SnapshotResult> {
        let start_time = Instant::now();
        let started_at = Utc::now();

        if SnapshotWriter::is_published(&job.destination).await {
            info!("Snapshot {} already exists, nothing to do", job.destination.display());
            return Ok(SnapshotResult::skipped(job.destination.clone(), started_at, 0));
        }

        info!(
            "Starting snapshot into {} ({} filter(s), concurrency {}, {} encrypted type(s))",
            job.destination.display(),
            job.template.filters.len(),
            self.concurrency,
            self.encryption.len()
        );

        let writer = SnapshotWriter::create(&job.destination).await?;
        let (filters, stats) = match self.run_staged(&writer, &job.template).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_cancelled() {
                    info!("Snapshot into {} cancelled", job.destination.display());
                } else {
                    error!("Snapshot into {} failed: {}", job.destination.display(), e);
                }
                writer.discard().await;
                return Err(e);
            }
        };

        // Last chance to back out before the snapshot becomes visible.
        if self.cancel_token.is_cancelled() {
            writer.discard().await;
            return Err(SnapshotError::Cancelled);
        }
        let destination = match writer.publish().await? {
            Publication::Published(destination) => destination,
            Publication::AlreadyPublished(destination) => {
                let duration_secs = start_time.elapsed().as_secs();
                return Ok(SnapshotResult::skipped(destination, started_at, duration_secs));
            }
        };

        let duration_secs = start_time.elapsed().as_secs();
        info!(
            "Snapshot completed: {} objects written, {} skipped, {} files, {}s",
            stats.objects_written, stats.objects_skipped, stats.files_written, duration_secs
        );

        Ok(SnapshotResult {
            destination,
            skipped_existing: false,
            filters,
            objects_written: stats.objects_written,
            objects_skipped: stats.objects_skipped,
            files_written: stats.files_written,
            started_at,
            duration_secs,
        })
    }

    /// Capture every filter into the staging tree and record the realized filters.
    async fn run_staged(
        &self,
        writer: &SnapshotWriter,
        template: &BackupTemplate,
    ) -> Result<(Vec<Filter>, CaptureStats)> {
        let ctx = CaptureContext {
            selector: &self.selector,
            encryption: &self.encryption,
            writer,
            cancel_token: &self.cancel_token,
        };

        let mut realized = Vec::with_capacity(template.filters.len());
        let mut stats = CaptureStats::default();

        for (idx, filter) in template.filters.iter().enumerate() {
            ctx.check_cancelled()?;
            let resolved = ctx.cancellable(self.resolver.resolve(filter)).await?;
            info!(
                "Filter #{} ({}): {} resource type(s) to capture",
                idx,
                resolved.group_version,
                resolved.resources.len()
            );

            // `buffered` keeps discovery order, so realized namespaces are deterministic.
            let captures: Vec<_> = stream::iter(resolved.resources.iter())
                .map(|res| capture_resource(&ctx, &resolved, res))
                .buffered(self.concurrency)
                .try_collect()
                .await?;

            let mut filter = resolved.filter.clone();
            for capture in captures {
                stats.merge(capture.stats);
                filter.record_namespaces(capture.matched_namespaces);
            }
            realized.push(filter);
        }

        ctx.check_cancelled()?;
        writer.write_filters(&realized).await?;
        Ok((realized, stats))
    }
}
