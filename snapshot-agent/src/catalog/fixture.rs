//! File-backed catalog.
//!
//! Serves discovery and listing from a single JSON document:
//!
//! ```text
//! {"groupVersions": {"v1": [{"name": "services", "namespaced": true,
//!                            "verbs": ["list", "update"], "items": [...]}]}}
//! ```

use super::{Discovery, ListSelector, ObjectLister};
use crate::model::{GroupVersion, ObjectRecord, ResourceTypeDescriptor};
use crate::utils::errors::BoxError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
struct FixtureResource {
    #[serde(flatten)]
    descriptor: ResourceTypeDescriptor,

    #[serde(default)]
    items: Vec<ObjectRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureCatalog {
    #[serde(default)]
    group_versions: HashMap<String, Vec<FixtureResource>>,
}

impl FixtureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let mut catalog: FixtureCatalog = serde_json::from_str(content)?;
        // Re-key on the canonical rendering so "v1" and " v1" agree.
        let mut normalized = HashMap::new();
        for (key, resources) in catalog.group_versions.drain() {
            let gv = GroupVersion::parse(&key)
                .ok_or_else(|| anyhow::anyhow!("invalid group/version {:?} in catalog", key))?;
            normalized.insert(gv.to_string(), resources);
        }
        catalog.group_versions = normalized;
        Ok(catalog)
    }

    /// Register a resource type and its objects under `gv`.
    pub fn with_resource(
        mut self,
        gv: &str,
        descriptor: ResourceTypeDescriptor,
        items: Vec<ObjectRecord>,
    ) -> Self {
        let key = GroupVersion::parse(gv)
            .map(|gv| gv.to_string())
            .unwrap_or_else(|| gv.to_string());
        self.group_versions
            .entry(key)
            .or_default()
            .push(FixtureResource { descriptor, items });
        self
    }

    fn resource(&self, gv: &GroupVersion, name: &str) -> Option<&FixtureResource> {
        self.group_versions
            .get(&gv.to_string())?
            .iter()
            .find(|r| r.descriptor.name == name)
    }
}

#[async_trait]
impl Discovery for FixtureCatalog {
    async fn resources_for_group_version(
        &self,
        gv: &GroupVersion,
    ) -> Result<Vec<ResourceTypeDescriptor>, BoxError> {
        let resources = self
            .group_versions
            .get(&gv.to_string())
            .ok_or_else(|| format!("the server could not find the requested resource ({})", gv))?;
        Ok(resources.iter().map(|r| r.descriptor.clone()).collect())
    }
}

#[async_trait]
impl ObjectLister for FixtureCatalog {
    async fn list(
        &self,
        resource: &ResourceTypeDescriptor,
        gv: &GroupVersion,
        selector: &ListSelector,
    ) -> Result<Vec<ObjectRecord>, BoxError> {
        let fixture = self
            .resource(gv, &resource.name)
            .ok_or_else(|| format!("resource {} not served by {}", resource.name, gv))?;

        let mut items = Vec::with_capacity(fixture.items.len());
        for item in &fixture.items {
            let name = item.name()?;
            // Cluster-scoped objects have no namespace to constrain.
            let namespace = if resource.namespaced { item.namespace()? } else { None };
            let selector_matches = if resource.namespaced {
                selector.matches(name, namespace)
            } else {
                selector.names.is_empty() || selector.names.iter().any(|n| n == name)
            };
            if selector_matches {
                items.push(item.clone());
            }
        }
        Ok(items)
    }
}
