//! Configuration management for the snapshot agent.
//!
//! Loads a job description from a TOML file. Relative paths are resolved
//! against the directory holding the configuration file.

use crate::encryption::{EncryptionBinding, EncryptionConfig};
use crate::executor::{PipelineOptions, SnapshotJob, DEFAULT_CONCURRENCY};
use crate::model::BackupTemplate;
use crate::resolver::ExclusionSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub snapshot: SnapshotConfig,
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot root; the run is skipped if it already exists
    pub destination: PathBuf,

    /// JSON array of filters
    pub template: PathBuf,

    /// JSON encryption configuration; absent means everything is stored in clear
    #[serde(default)]
    pub encryption_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON document serving discovery and listing
    pub fixture: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Resource types captured in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline per discovery/list call in seconds (0 disables)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Resource types never backed up
    #[serde(default = "default_avoid_backup_resources")]
    pub avoid_backup_resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Prefix each line with the emitting module
    #[serde(default)]
    pub with_target: bool,
}

// Default values
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_avoid_backup_resources() -> Vec<String> {
    vec!["pods".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            avoid_backup_resources: default_avoid_backup_resources(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.snapshot.destination);
        resolve(&mut self.snapshot.template);
        resolve(&mut self.catalog.fixture);
        if let Some(p) = self.snapshot.encryption_config.as_mut() {
            resolve(p);
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            concurrency: self.pipeline.concurrency.max(1),
            call_timeout: (self.pipeline.call_timeout_secs > 0)
                .then(|| Duration::from_secs(self.pipeline.call_timeout_secs)),
            exclusions: ExclusionSet::new(self.pipeline.avoid_backup_resources.iter().cloned()),
        }
    }

    pub fn load_job(&self) -> anyhow::Result<SnapshotJob> {
        Ok(SnapshotJob {
            destination: self.snapshot.destination.clone(),
            template: BackupTemplate::from_file(&self.snapshot.template)?,
        })
    }

    pub fn load_encryption(&self) -> anyhow::Result<EncryptionBinding> {
        match &self.snapshot.encryption_config {
            Some(path) => Ok(EncryptionConfig::from_file(path)?.into_binding()?),
            None => Ok(EncryptionBinding::new()),
        }
    }
}
