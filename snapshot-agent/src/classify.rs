//! Object classification and sanitization.
//!
//! Decides where an object lands in the snapshot and strips the metadata the
//! server assigns, keeping the original UID as a label so a restore can
//! correlate recreated objects with what was captured.

use crate::model::{ObjectRecord, ResourceTypeDescriptor};
use crate::utils::errors::Result;

/// Label carrying the UID an object had when it was captured.
pub const ORIGINAL_UID_LABEL: &str = "original-uid";

/// Server-assigned metadata that would conflict on restore.
pub const VOLATILE_FIELDS: [&str; 4] = ["uid", "resourceVersion", "generation", "creationTimestamp"];

/// Ownership partition of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// No owner references: a root of an ownership tree
    Owners,
    /// At least one owner reference: recreated after its owners
    Dependents,
}

impl Partition {
    pub fn dir_name(self) -> &'static str {
        match self {
            Partition::Owners => "owners",
            Partition::Dependents => "dependents",
        }
    }
}

/// Where a kept object is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub partition: Partition,
    /// Extra top-level directory for type definitions and namespaces
    pub privileged_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Keep(Placement),
    /// Deleted with no finalizers left; nothing to preserve
    Skip,
}

/// Classify `object` and sanitize it in place. Skipped objects are not modified.
pub fn classify(object: &mut ObjectRecord, res: &ResourceTypeDescriptor) -> Result<Classification> {
    if object.is_finalizing_without_finalizers()? {
        return Ok(Classification::Skip);
    }

    sanitize(object)?;

    let partition = if object.has_owner_references()? {
        Partition::Dependents
    } else {
        Partition::Owners
    };
    let privileged_dir = res.is_privileged().then(|| res.name.clone());

    Ok(Classification::Keep(Placement {
        partition,
        privileged_dir,
    }))
}

/// Record the UID as [`ORIGINAL_UID_LABEL`] and drop every volatile field.
pub fn sanitize(object: &mut ObjectRecord) -> Result<()> {
    if let Some(uid) = object.uid()?.map(str::to_owned) {
        object.set_label(ORIGINAL_UID_LABEL, &uid)?;
    }

    let metadata = object.metadata_mut()?;
    for field in VOLATILE_FIELDS {
        metadata.remove(field);
    }
    Ok(())
}
