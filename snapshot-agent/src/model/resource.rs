//! Resource type descriptors and group/version identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Group of cluster-scoped type definitions, restored before anything else.
pub const CUSTOM_RESOURCE_DEFINITIONS: &str = "customresourcedefinitions";

/// Namespace objects, restored right after type definitions.
pub const NAMESPACES: &str = "namespaces";

/// An API group and version, e.g. `apps/v1`. The core group is empty (`v1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    /// Parse `group/version` or a bare `version` for the core group.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.split_once('/') {
            None if !value.is_empty() => Some(Self {
                group: String::new(),
                version: value.to_string(),
            }),
            Some((group, version))
                if !group.is_empty() && !version.is_empty() && !version.contains('/') =>
            {
                Some(Self {
                    group: group.to_string(),
                    version: version.to_string(),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.version)
        } else {
            write!(f, "{}/{}", self.group, self.version)
        }
    }
}

/// Resource type name qualified by its owning group. Keys encryption bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupResource {
    pub resource: String,
    #[serde(default)]
    pub group: String,
}

impl GroupResource {
    pub fn new(resource: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// One resource type as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeDescriptor {
    /// Plural resource name, e.g. `services`
    pub name: String,

    /// Owning API group; empty means "same as the group/version queried"
    #[serde(default)]
    pub group: String,

    pub namespaced: bool,

    #[serde(default)]
    pub verbs: Vec<String>,
}

impl ResourceTypeDescriptor {
    pub fn new<I, S>(name: impl Into<String>, group: impl Into<String>, namespaced: bool, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            group: group.into(),
            namespaced,
            verbs: verbs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn can_list(&self) -> bool {
        self.verbs.iter().any(|v| v == "list")
    }

    pub fn can_update(&self) -> bool {
        self.verbs.iter().any(|v| v == "update" || v == "patch")
    }

    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(&self.name, &self.group)
    }

    /// Type definitions and namespaces get their own top-level directory.
    pub fn is_privileged(&self) -> bool {
        self.name == CUSTOM_RESOURCE_DEFINITIONS || self.name == NAMESPACES
    }

    /// Directory name inside `owners/` and `dependents/`: `<name>.<group>#<version>`.
    pub fn storage_dir_name(&self, gv: &GroupVersion) -> String {
        format!("{}.{}#{}", self.name, gv.group, gv.version)
    }
}
