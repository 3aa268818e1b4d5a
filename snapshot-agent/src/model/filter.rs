//! Declarative backup filters.
//!
//! A filter selects resource types under one API group/version and then
//! instances of those types by name and namespace. Pattern fields are
//! expanded into explicit lists during a run so the persisted copy
//! (`filters.json`) replays deterministically.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pattern meaning "every resource type in the group/version".
pub const MATCH_ALL_KINDS: &str = ".";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Resource family and version, e.g. `v1` or `apps/v1`
    #[serde(alias = "apiGroup")]
    pub api_group_version: String,

    /// Pattern matched against resource type names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds_regex: Option<String>,

    /// Explicit resource type names; filled in from discovery when empty
    #[serde(default)]
    pub kinds: Vec<String>,

    /// Exact instance names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,

    /// Pattern matched against instance names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name_regex: Option<String>,

    /// Exact namespaces; expanded with namespaces matched by `namespace_regex`
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Pattern matched against instance namespaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_regex: Option<String>,
}

impl Filter {
    pub fn new(api_group_version: impl Into<String>) -> Self {
        Self {
            api_group_version: api_group_version.into(),
            ..Default::default()
        }
    }

    pub fn with_kinds_regex(mut self, pattern: impl Into<String>) -> Self {
        self.kinds_regex = Some(pattern.into());
        self
    }

    pub fn with_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resource_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resource_name_regex(mut self, pattern: impl Into<String>) -> Self {
        self.resource_name_regex = Some(pattern.into());
        self
    }

    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_namespace_regex(mut self, pattern: impl Into<String>) -> Self {
        self.namespace_regex = Some(pattern.into());
        self
    }

    /// Kinds pattern with empty strings treated as unset.
    pub fn kinds_pattern(&self) -> Option<&str> {
        non_empty(&self.kinds_regex)
    }

    pub fn resource_name_pattern(&self) -> Option<&str> {
        non_empty(&self.resource_name_regex)
    }

    pub fn namespace_pattern(&self) -> Option<&str> {
        non_empty(&self.namespace_regex)
    }

    /// Append namespaces not already recorded, preserving first-seen order.
    pub fn record_namespaces<I>(&mut self, namespaces: I)
    where
        I: IntoIterator<Item = String>,
    {
        for ns in namespaces {
            if !self.namespaces.contains(&ns) {
                self.namespaces.push(ns);
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Ordered filter list of a named backup template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupTemplate {
    pub filters: Vec<Filter>,
}

impl BackupTemplate {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    /// Load a template from a JSON array of filters.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let template: BackupTemplate = serde_json::from_str(&content)?;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let filter: Filter = serde_json::from_str(
            r#"{"apiGroupVersion": "apps/v1", "kindsRegex": "^deployments$", "namespaceRegex": "^team-"}"#,
        )
        .unwrap();

        assert_eq!(filter.api_group_version, "apps/v1");
        assert_eq!(filter.kinds_pattern(), Some("^deployments$"));
        assert_eq!(filter.namespace_pattern(), Some("^team-"));
        assert!(filter.kinds.is_empty());
        assert!(filter.resource_name_pattern().is_none());
    }

    #[test]
    fn test_accepts_api_group_alias() {
        let filter: Filter = serde_json::from_str(r#"{"apiGroup": "v1", "kinds": ["secrets"]}"#).unwrap();
        assert_eq!(filter.api_group_version, "v1");
        assert_eq!(filter.kinds, vec!["secrets"]);
    }

    #[test]
    fn test_empty_pattern_is_unset() {
        let filter = Filter::new("v1").with_resource_name_regex("");
        assert!(filter.resource_name_pattern().is_none());
    }

    #[test]
    fn test_serialized_filter_always_has_kinds() {
        let json = serde_json::to_value(Filter::new("v1")).unwrap();
        assert_eq!(json["kinds"], serde_json::json!([]));
        assert!(json.get("kindsRegex").is_none());
    }

    #[test]
    fn test_record_namespaces_dedupes() {
        let mut filter = Filter::new("v1").with_namespaces(["default"]);
        filter.record_namespaces(vec![
            "team-a".to_string(),
            "default".to_string(),
            "team-a".to_string(),
            "team-b".to_string(),
        ]);
        assert_eq!(filter.namespaces, vec!["default", "team-a", "team-b"]);
    }

    #[test]
    fn test_template_is_a_json_array() {
        let template: BackupTemplate =
            serde_json::from_str(r#"[{"apiGroupVersion": "v1", "kindsRegex": "."}]"#).unwrap();
        assert_eq!(template.filters.len(), 1);
        assert_eq!(template.filters[0].kinds_pattern(), Some(MATCH_ALL_KINDS));
    }
}
