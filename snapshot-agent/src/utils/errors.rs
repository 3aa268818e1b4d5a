//! Custom error types for the snapshot agent.

use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by the injected catalog and encryption capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Discovery error for {group_version}: {source}")]
    Discovery {
        group_version: String,
        #[source]
        source: BoxError,
    },

    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("List error for {resource}: {source}")]
    List {
        resource: String,
        #[source]
        source: BoxError,
    },

    #[error("Encryption error for {resource} object {object}: {source}")]
    Encryption {
        resource: String,
        object: String,
        #[source]
        source: BoxError,
    },

    #[error("Write error at {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Layout error at {}: {source}", .path.display())]
    Layout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed object: {0}")]
    MalformedObject(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot cancelled")]
    Cancelled,
}

impl SnapshotError {
    /// True when the run stopped because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SnapshotError::Cancelled)
    }

    /// Prefix a malformed-object error with the resource type it came from,
    /// e.g. `apps/v1/deployments`. Other variants already carry their context.
    pub fn in_resource(self, resource: impl std::fmt::Display) -> Self {
        match self {
            SnapshotError::MalformedObject(msg) => SnapshotError::MalformedObject(format!("{}: {}", resource, msg)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_resource_prefixes_malformed_objects() {
        let err = SnapshotError::MalformedObject("metadata.name is missing".to_string()).in_resource("v1/services");
        assert_eq!(err.to_string(), "Malformed object: v1/services: metadata.name is missing");

        let err = SnapshotError::Config("bad".to_string()).in_resource("v1/services");
        assert_eq!(err.to_string(), "Configuration error: bad");
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
