//! Capabilities consumed from the object catalog.
//!
//! The transport that reaches the catalog is not part of this crate; callers
//! inject implementations of [`Discovery`] and [`ObjectLister`]. The
//! [`fixture`] module provides a file-backed catalog used by the CLI and tests.

pub mod fixture;

use crate::model::{GroupVersion, ObjectRecord, ResourceTypeDescriptor};
use crate::utils::errors::BoxError;
use async_trait::async_trait;

pub use fixture::FixtureCatalog;

/// Enumerates the resource types served under a group/version.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn resources_for_group_version(
        &self,
        gv: &GroupVersion,
    ) -> Result<Vec<ResourceTypeDescriptor>, BoxError>;
}

/// Lists instances of one resource type, pre-filtered by an exact-match selector.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    async fn list(
        &self,
        resource: &ResourceTypeDescriptor,
        gv: &GroupVersion,
        selector: &ListSelector,
    ) -> Result<Vec<ObjectRecord>, BoxError>;
}

/// Server-side pre-filter. Each non-empty constraint must hold (AND).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSelector {
    pub names: Vec<String>,
    pub namespaces: Vec<String>,
}

impl ListSelector {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.namespaces.is_empty()
    }

    /// Exact-match evaluation for catalogs without native selector support.
    pub fn matches(&self, name: &str, namespace: Option<&str>) -> bool {
        let name_ok = self.names.is_empty() || self.names.iter().any(|n| n == name);
        let namespace_ok = self.namespaces.is_empty()
            || namespace.is_some_and(|ns| self.namespaces.iter().any(|n| n == ns));
        name_ok && namespace_ok
    }

    /// Field-selector rendering, e.g. `metadata.name=a,metadata.namespace=b`.
    pub fn to_field_selector(&self) -> String {
        self.names
            .iter()
            .map(|n| format!("metadata.name={}", n))
            .chain(self.namespaces.iter().map(|ns| format!("metadata.namespace={}", ns)))
            .collect::<Vec<_>>()
            .join(",")
    }
}
