//! Untyped catalog objects with typed access to `metadata`.

use crate::utils::errors::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One catalog object as an open-ended JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRecord(Map<String, Value>);

impl ObjectRecord {
    /// Wrap a JSON value, which must be an object carrying a valid `metadata.name`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let record = Self(map);
                record.name()?;
                Ok(record)
            }
            other => Err(SnapshotError::MalformedObject(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn metadata(&self) -> Result<&Map<String, Value>> {
        match self.0.get("metadata") {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(SnapshotError::MalformedObject(format!(
                "metadata must be an object, got {}",
                type_name(other)
            ))),
            None => Err(SnapshotError::MalformedObject("missing metadata".to_string())),
        }
    }

    pub fn metadata_mut(&mut self) -> Result<&mut Map<String, Value>> {
        match self.0.get_mut("metadata") {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(SnapshotError::MalformedObject(format!(
                "metadata must be an object, got {}",
                type_name(other)
            ))),
            None => Err(SnapshotError::MalformedObject("missing metadata".to_string())),
        }
    }

    pub fn name(&self) -> Result<&str> {
        match self.metadata()?.get("name") {
            Some(Value::String(name)) if !name.is_empty() => Ok(name.as_str()),
            _ => Err(SnapshotError::MalformedObject(
                "metadata.name must be a non-empty string".to_string(),
            )),
        }
    }

    pub fn namespace(&self) -> Result<Option<&str>> {
        self.optional_str("namespace")
    }

    pub fn uid(&self) -> Result<Option<&str>> {
        self.optional_str("uid")
    }

    /// True when `metadata.ownerReferences` is a non-empty list.
    pub fn has_owner_references(&self) -> Result<bool> {
        Ok(is_non_empty_list(self.metadata()?.get("ownerReferences")))
    }

    /// Deleted objects with no finalizers left are already gone for all practical purposes.
    pub fn is_finalizing_without_finalizers(&self) -> Result<bool> {
        let metadata = self.metadata()?;
        let deleting = !matches!(metadata.get("deletionTimestamp"), None | Some(Value::Null));
        Ok(deleting && !is_non_empty_list(metadata.get("finalizers")))
    }

    /// Label value, if `metadata.labels` holds a string under `key`.
    pub fn label(&self, key: &str) -> Result<Option<&str>> {
        Ok(self
            .metadata()?
            .get("labels")
            .and_then(Value::as_object)
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str))
    }

    /// Insert a label, creating `metadata.labels` when absent.
    pub fn set_label(&mut self, key: &str, value: &str) -> Result<()> {
        let metadata = self.metadata_mut()?;
        let labels = metadata
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if labels.is_null() {
            *labels = Value::Object(Map::new());
        }
        match labels {
            Value::Object(labels) => {
                labels.insert(key.to_string(), Value::String(value.to_string()));
                Ok(())
            }
            other => Err(SnapshotError::MalformedObject(format!(
                "metadata.labels must be an object, got {}",
                type_name(other)
            ))),
        }
    }

    fn optional_str(&self, field: &str) -> Result<Option<&str>> {
        match self.metadata()?.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(SnapshotError::MalformedObject(format!(
                "metadata.{} must be a string, got {}",
                field,
                type_name(other)
            ))),
        }
    }
}

fn is_non_empty_list(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Array(items)) if !items.is_empty())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
