//! Filter resolution: from a declarative filter to concrete resource types.

use crate::catalog::Discovery;
use crate::model::filter::MATCH_ALL_KINDS;
use crate::model::{Filter, GroupVersion, ResourceTypeDescriptor};
use crate::utils::errors::{Result, SnapshotError};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resource types that are never backed up, whatever the filter says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionSet(HashSet<String>);

impl ExclusionSet {
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(resources.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.0.contains(resource)
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::new(["pods"])
    }
}

/// Compiled instance-level patterns of a filter.
#[derive(Debug, Clone, Default)]
pub struct ObjectPatterns {
    pub name: Option<Regex>,
    pub namespace: Option<Regex>,
}

impl ObjectPatterns {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.namespace.is_none()
    }
}

/// A filter after discovery: the realized copy plus everything downstream needs.
#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    /// Realized filter; `kinds` is always populated
    pub filter: Filter,
    pub group_version: GroupVersion,
    /// Eligible resource types, in discovery order
    pub resources: Vec<ResourceTypeDescriptor>,
    pub patterns: ObjectPatterns,
}

pub struct FilterResolver {
    discovery: Arc<dyn Discovery>,
    exclusions: ExclusionSet,
    call_timeout: Option<Duration>,
}

impl FilterResolver {
    pub fn new(discovery: Arc<dyn Discovery>, exclusions: ExclusionSet) -> Self {
        Self {
            discovery,
            exclusions,
            call_timeout: None,
        }
    }

    /// Bound each discovery call; expiry is reported as a discovery error.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Resolve `filter` into eligible resource types. The input is left untouched.
    pub async fn resolve(&self, filter: &Filter) -> Result<ResolvedFilter> {
        let group_version = GroupVersion::parse(&filter.api_group_version).ok_or_else(|| {
            SnapshotError::Discovery {
                group_version: filter.api_group_version.clone(),
                source: "invalid group/version".into(),
            }
        })?;

        // Patterns are compiled before any network traffic so a typo fails fast.
        let kinds_pattern = match filter.kinds_pattern() {
            Some(MATCH_ALL_KINDS) | None => None,
            Some(pattern) => Some(compile(pattern)?),
        };
        let patterns = ObjectPatterns {
            name: filter.resource_name_pattern().map(compile).transpose()?,
            namespace: filter.namespace_pattern().map(compile).transpose()?,
        };

        let discovered = self.discover(&group_version).await?;

        let matched = discovered.into_iter().filter(|res| {
            match (&kinds_pattern, filter.kinds_pattern()) {
                (Some(re), _) => re.is_match(&res.name),
                (None, Some(MATCH_ALL_KINDS)) => true,
                // No pattern: explicit kinds select exactly, otherwise everything.
                (None, _) => filter.kinds.is_empty() || filter.kinds.contains(&res.name),
            }
        });

        let mut resources = Vec::new();
        for mut res in matched {
            if res.group.is_empty() {
                res.group = group_version.group.clone();
            }
            if !self.is_eligible(&res) {
                continue;
            }
            debug!("Resource {} matched filter for {}", res.name, group_version);
            resources.push(res);
        }

        let mut realized = filter.clone();
        if realized.kinds.is_empty() {
            realized.kinds = resources.iter().map(|r| r.name.clone()).collect();
        }

        Ok(ResolvedFilter {
            filter: realized,
            group_version,
            resources,
            patterns,
        })
    }

    async fn discover(&self, gv: &GroupVersion) -> Result<Vec<ResourceTypeDescriptor>> {
        let call = self.discovery.resources_for_group_version(gv);
        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(format!("discovery timed out after {:?}", limit).into()),
            },
            None => call.await,
        };
        outcome.map_err(|source| SnapshotError::Discovery {
            group_version: gv.to_string(),
            source,
        })
    }

    /// A type is backed up only if it can be listed now and written back on restore.
    fn is_eligible(&self, res: &ResourceTypeDescriptor) -> bool {
        if self.exclusions.contains(&res.name) {
            debug!("Skipping excluded resource {}", res.name);
            return false;
        }
        if !res.can_list() {
            warn!("Cannot list resource {} (verbs: {:?}), skipping", res.name, res.verbs);
            return false;
        }
        if !res.can_update() {
            warn!("Cannot update resource {} (verbs: {:?}), skipping", res.name, res.verbs);
            return false;
        }
        true
    }
}

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| SnapshotError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FixtureCatalog;

    const RW: [&str; 4] = ["get", "list", "update", "patch"];

    fn core_catalog() -> Arc<FixtureCatalog> {
        Arc::new(
            FixtureCatalog::new()
                .with_resource("v1", ResourceTypeDescriptor::new("pods", "", true, RW), vec![])
                .with_resource("v1", ResourceTypeDescriptor::new("services", "", true, RW), vec![])
                .with_resource("v1", ResourceTypeDescriptor::new("secrets", "", true, RW), vec![])
                .with_resource("v1", ResourceTypeDescriptor::new("configmaps", "", true, RW), vec![])
                .with_resource(
                    "v1",
                    ResourceTypeDescriptor::new("componentstatuses", "", false, ["get", "list"]),
                    vec![],
                )
                .with_resource(
                    "v1",
                    ResourceTypeDescriptor::new("bindings", "", true, ["create"]),
                    vec![],
                ),
        )
    }

    fn resolver() -> FilterResolver {
        FilterResolver::new(core_catalog(), ExclusionSet::new(Vec::<String>::new()))
    }

    fn names(resolved: &ResolvedFilter) -> Vec<&str> {
        resolved.resources.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_dot_selects_every_eligible_type() {
        let resolved = resolver()
            .resolve(&Filter::new("v1").with_kinds_regex("."))
            .await
            .unwrap();
        assert_eq!(names(&resolved), vec!["pods", "services", "secrets", "configmaps"]);
        assert_eq!(resolved.filter.kinds, vec!["pods", "services", "secrets", "configmaps"]);
    }

    #[tokio::test]
    async fn test_regex_matches_are_complete_and_exact() {
        let resolved = resolver()
            .resolve(&Filter::new("v1").with_kinds_regex("^s"))
            .await
            .unwrap();
        assert_eq!(names(&resolved), vec!["services", "secrets"]);
        let re = Regex::new("^s").unwrap();
        assert!(resolved.resources.iter().all(|r| re.is_match(&r.name)));
    }

    #[tokio::test]
    async fn test_excluded_type_is_dropped_from_realized_kinds() {
        let resolver = FilterResolver::new(core_catalog(), ExclusionSet::default());
        let resolved = resolver
            .resolve(&Filter::new("v1").with_kinds_regex("^(pods|services)$"))
            .await
            .unwrap();
        assert_eq!(names(&resolved), vec!["services"]);
        assert_eq!(resolved.filter.kinds, vec!["services"]);
    }

    #[tokio::test]
    async fn test_ineligible_verbs_are_skipped() {
        let resolved = resolver()
            .resolve(&Filter::new("v1").with_kinds_regex("^(componentstatuses|bindings)$"))
            .await
            .unwrap();
        assert!(resolved.resources.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_kinds_are_kept() {
        let filter = Filter::new("v1").with_kinds(["secrets"]);
        let resolved = resolver().resolve(&filter).await.unwrap();
        assert_eq!(names(&resolved), vec!["secrets"]);
        assert_eq!(resolved.filter.kinds, vec!["secrets"]);
    }

    #[tokio::test]
    async fn test_input_filter_is_not_mutated() {
        let filter = Filter::new("v1").with_kinds_regex("^services$");
        let resolved = resolver().resolve(&filter).await.unwrap();
        assert!(filter.kinds.is_empty());
        assert_eq!(resolved.filter.kinds, vec!["services"]);
    }

    #[tokio::test]
    async fn test_invalid_kinds_pattern() {
        let err = resolver()
            .resolve(&Filter::new("v1").with_kinds_regex("(unclosed"))
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn test_invalid_object_pattern_fails_at_resolution() {
        let err = resolver()
            .resolve(&Filter::new("v1").with_kinds_regex(".").with_namespace_regex("[z-a]"))
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn test_unknown_group_version() {
        let err = resolver()
            .resolve(&Filter::new("apps/v1").with_kinds_regex("."))
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Discovery { .. }));
        assert!(err.to_string().contains("apps/v1"));
    }

    #[tokio::test]
    async fn test_group_is_filled_from_group_version() {
        let catalog = Arc::new(FixtureCatalog::new().with_resource(
            "example.com/v1",
            ResourceTypeDescriptor::new("widgets", "", true, RW),
            vec![],
        ));
        let resolver = FilterResolver::new(catalog, ExclusionSet::default());
        let resolved = resolver
            .resolve(&Filter::new("example.com/v1").with_kinds_regex("."))
            .await
            .unwrap();
        assert_eq!(resolved.resources[0].group, "example.com");
    }
}
