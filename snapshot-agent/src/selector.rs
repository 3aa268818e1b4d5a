//! Object selection for one resource type.
//!
//! Exact names and namespaces are pushed down to the lister. Patterns are
//! evaluated client-side afterwards. When both a name pattern and a
//! namespace pattern are set, an object is kept if it matches either one:
//! the two passes are unioned, not intersected.

use crate::catalog::{ListSelector, ObjectLister};
use crate::model::{ObjectRecord, ResourceTypeDescriptor};
use crate::resolver::ResolvedFilter;
use crate::utils::errors::{Result, SnapshotError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Objects picked for one resource type.
#[derive(Debug, Default)]
pub struct Selection {
    pub objects: Vec<ObjectRecord>,
    /// Namespaces matched by the namespace pattern, first-seen order, no duplicates
    pub matched_namespaces: Vec<String>,
}

pub struct ObjectSelector {
    lister: Arc<dyn ObjectLister>,
    call_timeout: Option<Duration>,
}

impl ObjectSelector {
    pub fn new(lister: Arc<dyn ObjectLister>) -> Self {
        Self {
            lister,
            call_timeout: None,
        }
    }

    /// Bound each list call; expiry is reported as a list error.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn list_selector(res: &ResourceTypeDescriptor, resolved: &ResolvedFilter) -> ListSelector {
        ListSelector {
            names: resolved.filter.resource_names.clone(),
            namespaces: if res.namespaced {
                resolved.filter.namespaces.clone()
            } else {
                Vec::new()
            },
        }
    }

    pub async fn select(&self, res: &ResourceTypeDescriptor, resolved: &ResolvedFilter) -> Result<Selection> {
        let selector = Self::list_selector(res, resolved);
        let candidates = self.fetch(res, resolved, &selector).await?;
        if selector.is_empty() {
            debug!("Listed {} {} object(s)", candidates.len(), res.name);
        } else {
            debug!(
                "Listed {} {} object(s) with selector {:?}",
                candidates.len(),
                res.name,
                selector.to_field_selector()
            );
        }
        let context = || format!("{}/{}", resolved.group_version, res.name);

        let name_re = resolved.patterns.name.as_ref();
        // Namespace constraints mean nothing for cluster-scoped types.
        let namespace_re = resolved.patterns.namespace.as_ref().filter(|_| res.namespaced);

        if name_re.is_none() && namespace_re.is_none() {
            return Ok(Selection {
                objects: candidates,
                matched_namespaces: Vec::new(),
            });
        }

        let mut keep = vec![false; candidates.len()];
        let mut matched_namespaces: Vec<String> = Vec::new();

        if let Some(re) = name_re {
            for (idx, object) in candidates.iter().enumerate() {
                if re.is_match(object.name().map_err(|e| e.in_resource(context()))?) {
                    keep[idx] = true;
                }
            }
        }

        if let Some(re) = namespace_re {
            for (idx, object) in candidates.iter().enumerate() {
                let Some(namespace) = object.namespace().map_err(|e| e.in_resource(context()))? else {
                    continue;
                };
                if !re.is_match(namespace) {
                    continue;
                }
                keep[idx] = true;
                if !matched_namespaces.iter().any(|ns| ns == namespace) {
                    matched_namespaces.push(namespace.to_string());
                }
            }
        }

        let objects = candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(object, kept)| kept.then_some(object))
            .collect();

        Ok(Selection {
            objects,
            matched_namespaces,
        })
    }

    async fn fetch(
        &self,
        res: &ResourceTypeDescriptor,
        resolved: &ResolvedFilter,
        selector: &ListSelector,
    ) -> Result<Vec<ObjectRecord>> {
        let call = self.lister.list(res, &resolved.group_version, selector);
        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(format!("list timed out after {:?}", limit).into()),
            },
            None => call.await,
        };
        outcome.map_err(|source| SnapshotError::List {
            resource: format!("{}/{}", resolved.group_version, res.name),
            source,
        })
    }
}
