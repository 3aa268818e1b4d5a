//! Snapshot Agent Library
//!
//! Exports a filtered snapshot of a cluster object catalog to disk:
//! resolve filters into resource types, select objects, split them into
//! owners and dependents, strip server-assigned metadata, optionally
//! encrypt, and write a replayable tree plus the realized `filters.json`.

pub mod catalog;
pub mod classify;
pub mod config;
pub mod daemon;
pub mod encryption;
pub mod executor;
pub mod model;
pub mod resolver;
pub mod selector;
pub mod utils;
pub mod writer;

// Re-export commonly used types
pub use config::Config;
pub use executor::{PipelineOptions, SnapshotExecutor, SnapshotJob, SnapshotResult};
pub use utils::errors::SnapshotError;
pub type Result<T> = std::result::Result<T, SnapshotError>;
