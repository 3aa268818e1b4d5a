//! Snapshot layout on disk.
//!
//! A run writes into a hidden staging directory next to the destination and
//! renames it into place only when everything, `filters.json` included, is
//! on disk. An existing destination therefore always holds a finished
//! snapshot.
//!
//! ```text
//! <destination>/
//!   filters.json
//!   owners/<resource>.<group>#<version>/<name>.json
//!   dependents/<resource>.<group>#<version>/<name>.json
//!   customresourcedefinitions/<name>.json
//!   namespaces/<name>.json
//! ```

use crate::classify::{Partition, Placement};
use crate::model::{Filter, GroupVersion, ResourceTypeDescriptor};
use crate::utils::errors::{Result, SnapshotError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

pub const FILTERS_FILE: &str = "filters.json";

/// How a staged snapshot ended up at its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publication {
    Published(PathBuf),
    /// Another run published the same destination first; our staging tree was dropped.
    AlreadyPublished(PathBuf),
}

pub struct SnapshotWriter {
    destination: PathBuf,
    staging: PathBuf,
}

impl SnapshotWriter {
    /// True when a finished snapshot already occupies `destination`.
    pub async fn is_published(destination: &Path) -> bool {
        fs::metadata(destination)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the staging tree with its `owners/` and `dependents/` partitions.
    pub async fn create(destination: &Path) -> Result<Self> {
        let layout_error = |path: &Path, source| SnapshotError::Layout {
            path: path.to_path_buf(),
            source,
        };

        let file_name = destination
            .file_name()
            .ok_or_else(|| {
                layout_error(
                    destination,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "destination has no final component"),
                )
            })?
            .to_string_lossy()
            .to_string();
        if let Ok(meta) = fs::symlink_metadata(destination).await {
            if !meta.is_dir() {
                return Err(layout_error(
                    destination,
                    std::io::Error::new(std::io::ErrorKind::AlreadyExists, "destination exists and is not a directory"),
                ));
            }
        }
        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| layout_error(&parent, e))?;

        let staging = parent.join(format!(".{}.staging-{}", file_name, uuid::Uuid::new_v4()));
        fs::create_dir(&staging)
            .await
            .map_err(|e| layout_error(&staging, e))?;

        for partition in [Partition::Owners, Partition::Dependents] {
            let dir = staging.join(partition.dir_name());
            fs::create_dir(&dir).await.map_err(|e| layout_error(&dir, e))?;
        }

        debug!("Staging snapshot in {}", staging.display());
        Ok(Self {
            destination: destination.to_path_buf(),
            staging,
        })
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging
    }

    /// Write one object to every directory its placement names. Returns the files written.
    pub async fn write_placement(
        &self,
        placement: &Placement,
        res: &ResourceTypeDescriptor,
        gv: &GroupVersion,
        name: &str,
        bytes: &[u8],
    ) -> Result<usize> {
        let mut written = 0;
        if let Some(dir) = &placement.privileged_dir {
            self.write_object(Path::new(dir), name, bytes).await?;
            written += 1;
        }
        let typed_dir = Path::new(placement.partition.dir_name()).join(res.storage_dir_name(gv));
        self.write_object(&typed_dir, name, bytes).await?;
        Ok(written + 1)
    }

    /// Write `<relative_dir>/<name>.json` under the staging root.
    pub async fn write_object(&self, relative_dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        validate_file_stem(name)?;

        let dir = self.staging.join(relative_dir);
        // create_dir_all leaves existing directories and their files alone.
        fs::create_dir_all(&dir).await.map_err(|source| SnapshotError::Layout {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(format!("{}.json", name));
        if fs::try_exists(&path).await.unwrap_or(false) {
            warn!("Overwriting {} (same name in another namespace?)", path.display());
        }
        write_atomic(&path, bytes).await?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    pub async fn write_filters(&self, filters: &[Filter]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(filters)?;
        write_atomic(&self.staging.join(FILTERS_FILE), &bytes).await
    }

    /// Move the staging tree onto the destination. On failure the staging tree is removed.
    ///
    /// A concurrent run that published the same destination first wins; that
    /// snapshot is kept and this one reports `AlreadyPublished`.
    pub async fn publish(self) -> Result<Publication> {
        if let Err(source) = fs::rename(&self.staging, &self.destination).await {
            let destination = self.destination.clone();
            self.discard().await;
            if Self::is_published(&destination).await {
                info!("Snapshot {} was published by another run", destination.display());
                return Ok(Publication::AlreadyPublished(destination));
            }
            return Err(SnapshotError::Layout {
                path: destination,
                source,
            });
        }
        info!("Published snapshot at {}", self.destination.display());
        Ok(Publication::Published(self.destination))
    }

    /// Remove the staging tree. Nothing is published.
    pub async fn discard(self) {
        if let Err(e) = fs::remove_dir_all(&self.staging).await {
            warn!("Failed to remove staging directory {}: {}", self.staging.display(), e);
        }
    }
}

/// Write through a temporary sibling and rename, so readers never see partial content.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_error = |source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).await.map_err(write_error)?;
    fs::rename(&tmp, path).await.map_err(write_error)
}

fn validate_file_stem(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\', '\0'][..]) {
        return Err(SnapshotError::MalformedObject(format!(
            "object name {:?} cannot be used as a file name",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn widgets() -> ResourceTypeDescriptor {
        ResourceTypeDescriptor::new("widgets", "example.com", true, ["list", "update"])
    }

    #[tokio::test]
    async fn test_create_stages_partitions() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("run-1");

        let writer = SnapshotWriter::create(&destination).await.unwrap();
        assert!(writer.staging_root().join("owners").is_dir());
        assert!(writer.staging_root().join("dependents").is_dir());
        assert!(!destination.exists());
        assert!(!SnapshotWriter::is_published(&destination).await);
    }

    #[tokio::test]
    async fn test_placement_paths() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("run-1");
        let writer = SnapshotWriter::create(&destination).await.unwrap();
        let gv = GroupVersion::parse("example.com/v1").unwrap();

        let owners = Placement {
            partition: Partition::Owners,
            privileged_dir: None,
        };
        let dependents = Placement {
            partition: Partition::Dependents,
            privileged_dir: None,
        };
        assert_eq!(writer.write_placement(&owners, &widgets(), &gv, "a", b"{}").await.unwrap(), 1);
        assert_eq!(writer.write_placement(&dependents, &widgets(), &gv, "b", b"{}").await.unwrap(), 1);

        assert_eq!(writer.publish().await.unwrap(), Publication::Published(destination.clone()));
        let published = destination;
        assert!(published.join("owners/widgets.example.com#v1/a.json").is_file());
        assert!(published.join("dependents/widgets.example.com#v1/b.json").is_file());
        assert!(!published.join("owners/widgets.example.com#v1/a.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_privileged_placement_writes_twice() {
        let temp_dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::create(&temp_dir.path().join("run")).await.unwrap();
        let gv = GroupVersion::parse("v1").unwrap();
        let namespaces = ResourceTypeDescriptor::new("namespaces", "", false, ["list", "update"]);
        let placement = Placement {
            partition: Partition::Owners,
            privileged_dir: Some("namespaces".to_string()),
        };

        let written = writer
            .write_placement(&placement, &namespaces, &gv, "prod", b"{\"a\":1}")
            .await
            .unwrap();
        assert_eq!(written, 2);
        let root = writer.staging_root();
        assert_eq!(std::fs::read(root.join("namespaces/prod.json")).unwrap(), b"{\"a\":1}");
        assert_eq!(std::fs::read(root.join("owners/namespaces.#v1/prod.json")).unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_existing_files_survive_new_writes() {
        let temp_dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::create(&temp_dir.path().join("run")).await.unwrap();
        let dir = Path::new("owners/widgets.example.com#v1");

        writer.write_object(dir, "a", b"1").await.unwrap();
        writer.write_object(dir, "b", b"2").await.unwrap();

        let root = writer.staging_root();
        assert!(root.join("owners/widgets.example.com#v1/a.json").is_file());
        assert!(root.join("owners/widgets.example.com#v1/b.json").is_file());
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let temp_dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::create(&temp_dir.path().join("run")).await.unwrap();
        for name in ["", "..", "../escape", "a/b"] {
            let err = writer.write_object(Path::new("owners"), name, b"{}").await.unwrap_err();
            assert!(matches!(err, SnapshotError::MalformedObject(_)), "{:?}", name);
        }
    }

    #[tokio::test]
    async fn test_filters_file() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("run");
        let writer = SnapshotWriter::create(&destination).await.unwrap();
        writer
            .write_filters(&[Filter::new("v1").with_kinds(["services"])])
            .await
            .unwrap();
        writer.publish().await.unwrap();

        let filters: Vec<Filter> =
            serde_json::from_slice(&std::fs::read(destination.join(FILTERS_FILE)).unwrap()).unwrap();
        assert_eq!(filters[0].kinds, vec!["services"]);
    }

    #[tokio::test]
    async fn test_publish_after_concurrent_publish_keeps_first_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("run");
        let first = SnapshotWriter::create(&destination).await.unwrap();
        let second = SnapshotWriter::create(&destination).await.unwrap();
        first.write_object(Path::new("owners"), "a", b"1").await.unwrap();
        second.write_object(Path::new("owners"), "a", b"2").await.unwrap();

        assert_eq!(first.publish().await.unwrap(), Publication::Published(destination.clone()));
        assert_eq!(
            second.publish().await.unwrap(),
            Publication::AlreadyPublished(destination.clone())
        );

        assert_eq!(std::fs::read(destination.join("owners/a.json")).unwrap(), b"1");
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_destination_occupied_by_file() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("run");
        std::fs::write(&destination, b"not a snapshot").unwrap();

        assert!(!SnapshotWriter::is_published(&destination).await);
        let err = SnapshotWriter::create(&destination).await.err().unwrap();
        assert!(matches!(err, SnapshotError::Layout { .. }));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_discard_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("run");
        let writer = SnapshotWriter::create(&destination).await.unwrap();
        writer.write_object(Path::new("owners"), "a", b"{}").await.unwrap();
        writer.discard().await;

        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
