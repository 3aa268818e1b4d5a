//! Per-resource-type capture: select, classify, protect, persist.

use crate::classify::{classify, Classification};
use crate::encryption::EncryptionBinding;
use crate::model::ResourceTypeDescriptor;
use crate::resolver::ResolvedFilter;
use crate::selector::ObjectSelector;
use crate::utils::errors::{Result, SnapshotError};
use crate::writer::SnapshotWriter;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Counters for objects handled by one or more capture passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub objects_written: usize,
    pub objects_skipped: usize,
    pub files_written: usize,
}

impl CaptureStats {
    pub fn merge(&mut self, other: CaptureStats) {
        self.objects_written += other.objects_written;
        self.objects_skipped += other.objects_skipped;
        self.files_written += other.files_written;
    }
}

/// Outcome of capturing one resource type.
#[derive(Debug, Default)]
pub struct TypeCapture {
    pub stats: CaptureStats,
    pub matched_namespaces: Vec<String>,
}

/// Everything a capture pass borrows from the running executor.
pub struct CaptureContext<'a> {
    pub selector: &'a ObjectSelector,
    pub encryption: &'a EncryptionBinding,
    pub writer: &'a SnapshotWriter,
    pub cancel_token: &'a CancellationToken,
}

impl CaptureContext<'_> {
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }
        Ok(())
    }

    /// Race `fut` against cancellation.
    pub async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(SnapshotError::Cancelled),
            result = fut => result,
        }
    }
}

pub async fn capture_resource(
    ctx: &CaptureContext<'_>,
    resolved: &ResolvedFilter,
    res: &ResourceTypeDescriptor,
) -> Result<TypeCapture> {
    ctx.check_cancelled()?;
    let gv = &resolved.group_version;
    let context = format!("{}/{}", gv, res.name);
    let selection = ctx.cancellable(ctx.selector.select(res, resolved)).await?;

    let mut stats = CaptureStats::default();
    for mut object in selection.objects {
        ctx.check_cancelled()?;
        let name = object.name().map_err(|e| e.in_resource(&context))?.to_string();

        let placement = match classify(&mut object, res).map_err(|e| e.in_resource(&context))? {
            Classification::Skip => {
                debug!("Skipping {} {}: deleted without finalizers", res.name, name);
                stats.objects_skipped += 1;
                continue;
            }
            Classification::Keep(placement) => placement,
        };

        let bytes = object.to_json_bytes()?;
        let bytes = ctx.encryption.protect(bytes, res, &name)?;
        stats.files_written += ctx
            .writer
            .write_placement(&placement, res, gv, &name, &bytes)
            .await
            .map_err(|e| e.in_resource(&context))?;
        stats.objects_written += 1;
    }

    info!(
        "Captured {}: {} written, {} skipped",
        context, stats.objects_written, stats.objects_skipped
    );
    Ok(TypeCapture {
        stats,
        matched_namespaces: selection.matched_namespaces,
    })
}
