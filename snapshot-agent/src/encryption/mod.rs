//! Encryption gate.
//!
//! Objects of resource types with a registered [`Transformer`] are encrypted
//! before they are written, with the object name as additional authenticated
//! data. Everything else is stored in clear.

pub mod aesgcm;

use crate::model::{GroupResource, ResourceTypeDescriptor};
use crate::utils::errors::{BoxError, Result, SnapshotError};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub use aesgcm::AesGcmTransformer;

/// Reversible byte transform bound to an identity (AAD).
pub trait Transformer: Send + Sync {
    fn transform_to_storage(&self, data: &[u8], aad: &[u8]) -> std::result::Result<Vec<u8>, BoxError>;

    fn transform_from_storage(&self, data: &[u8], aad: &[u8]) -> std::result::Result<Vec<u8>, BoxError>;

    /// Identifier for logs; never the key itself.
    fn key_id(&self) -> &str;
}

/// Transformers keyed by resource type and owning group.
#[derive(Clone, Default)]
pub struct EncryptionBinding {
    transformers: HashMap<GroupResource, Arc<dyn Transformer>>,
}

impl EncryptionBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: GroupResource, transformer: Arc<dyn Transformer>) {
        self.transformers.insert(resource, transformer);
    }

    pub fn with(mut self, resource: GroupResource, transformer: Arc<dyn Transformer>) -> Self {
        self.insert(resource, transformer);
        self
    }

    pub fn get(&self, resource: &GroupResource) -> Option<&Arc<dyn Transformer>> {
        self.transformers.get(resource)
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Encrypt `bytes` when `res` has a transformer, otherwise return them as-is.
    ///
    /// Encrypted output is a JSON string holding the base64 of the ciphertext.
    pub fn protect(&self, bytes: Vec<u8>, res: &ResourceTypeDescriptor, object_name: &str) -> Result<Vec<u8>> {
        let Some(transformer) = self.get(&res.group_resource()) else {
            return Ok(bytes);
        };

        let sealed = transformer
            .transform_to_storage(&bytes, object_name.as_bytes())
            .map_err(|source| SnapshotError::Encryption {
                resource: res.group_resource().to_string(),
                object: object_name.to_string(),
                source,
            })?;
        debug!(
            "Encrypted {} {} with key {} ({} -> {} bytes)",
            res.name,
            object_name,
            transformer.key_id(),
            bytes.len(),
            sealed.len()
        );
        Ok(serde_json::to_vec(&STANDARD.encode(sealed))?)
    }

    /// Inverse of [`protect`](Self::protect), for verifying a snapshot.
    pub fn unprotect(&self, stored: &[u8], res: &ResourceTypeDescriptor, object_name: &str) -> Result<Vec<u8>> {
        let Some(transformer) = self.get(&res.group_resource()) else {
            return Ok(stored.to_vec());
        };

        let encoded: String = serde_json::from_slice(stored)?;
        let encryption_error = |source: BoxError| SnapshotError::Encryption {
            resource: res.group_resource().to_string(),
            object: object_name.to_string(),
            source,
        };
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| encryption_error(Box::new(e)))?;
        transformer
            .transform_from_storage(&sealed, object_name.as_bytes())
            .map_err(encryption_error)
    }
}

impl std::fmt::Debug for EncryptionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.transformers.iter().map(|(k, v)| (k.to_string(), v.key_id().to_string())))
            .finish()
    }
}

/// On-disk encryption configuration.
///
/// ```json
/// {"resources": [{"resource": "secrets", "group": "", "keyEnv": "SECRETS_KEY"}]}
/// ```
///
/// Key fields are camelCase; the snake_case spellings (`key_hex`, `key_env`,
/// `key_id`) are accepted too.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub resources: Vec<ResourceKey>,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
    pub resource: String,

    #[serde(default)]
    pub group: String,

    /// 64-character hex AES-256 key
    #[serde(default, alias = "key_hex")]
    pub key_hex: Option<String>,

    /// Environment variable holding the hex key
    #[serde(default, alias = "key_env")]
    pub key_env: Option<String>,

    #[serde(default, alias = "key_id")]
    pub key_id: Option<String>,
}

impl std::fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceKey")
            .field("resource", &self.resource)
            .field("group", &self.group)
            .field("key_hex", &self.key_hex.as_ref().map(|_| "[REDACTED]"))
            .field("key_env", &self.key_env)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl EncryptionConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EncryptionConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Build one AES-GCM transformer per configured resource.
    pub fn into_binding(self) -> Result<EncryptionBinding> {
        let mut binding = EncryptionBinding::new();
        for entry in self.resources {
            let resource = GroupResource::new(&entry.resource, &entry.group);
            let key_hex = match (&entry.key_hex, &entry.key_env) {
                (Some(hex), _) => hex.clone(),
                (None, Some(var)) => std::env::var(var).map_err(|_| {
                    SnapshotError::Config(format!("environment variable '{}' not set for {}", var, resource))
                })?,
                (None, None) => {
                    return Err(SnapshotError::Config(format!("no key configured for {}", resource)));
                }
            };
            let key_id = entry.key_id.clone().unwrap_or_else(|| resource.to_string());
            let transformer = AesGcmTransformer::from_hex(&key_hex, key_id)
                .map_err(|e| SnapshotError::Config(format!("{}: {}", resource, e)))?;
            binding.insert(resource, Arc::new(transformer));
        }
        Ok(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> ResourceTypeDescriptor {
        ResourceTypeDescriptor::new("secrets", "", true, ["list", "update"])
    }

    fn binding() -> EncryptionBinding {
        EncryptionBinding::new().with(
            GroupResource::new("secrets", ""),
            Arc::new(AesGcmTransformer::generate("secrets").unwrap()),
        )
    }

    #[test]
    fn test_unbound_type_is_stored_in_clear() {
        let configmaps = ResourceTypeDescriptor::new("configmaps", "", true, ["list", "update"]);
        let bytes = br#"{"metadata":{"name":"a"}}"#.to_vec();
        assert_eq!(binding().protect(bytes.clone(), &configmaps, "a").unwrap(), bytes);
    }

    #[test]
    fn test_bound_type_roundtrips() {
        let binding = binding();
        let bytes = br#"{"metadata":{"name":"db"}}"#.to_vec();

        let stored = binding.protect(bytes.clone(), &secrets(), "db").unwrap();
        assert_ne!(stored, bytes);
        // Stored as a JSON string.
        assert!(serde_json::from_slice::<String>(&stored).is_ok());

        assert_eq!(binding.unprotect(&stored, &secrets(), "db").unwrap(), bytes);
    }

    #[test]
    fn test_ciphertext_is_bound_to_object_name() {
        let binding = binding();
        let stored = binding.protect(b"{}".to_vec(), &secrets(), "db").unwrap();
        let err = binding.unprotect(&stored, &secrets(), "other").unwrap_err();
        assert!(matches!(err, SnapshotError::Encryption { .. }));
    }

    struct FailingTransformer;

    impl Transformer for FailingTransformer {
        fn transform_to_storage(&self, _: &[u8], _: &[u8]) -> std::result::Result<Vec<u8>, BoxError> {
            Err("kms unavailable".into())
        }

        fn transform_from_storage(&self, _: &[u8], _: &[u8]) -> std::result::Result<Vec<u8>, BoxError> {
            Err("kms unavailable".into())
        }

        fn key_id(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_transformer_failure_is_an_encryption_error() {
        let binding = EncryptionBinding::new().with(GroupResource::new("secrets", ""), Arc::new(FailingTransformer));
        let err = binding.protect(b"{}".to_vec(), &secrets(), "db").unwrap_err();
        assert!(matches!(err, SnapshotError::Encryption { .. }));
        assert!(err.to_string().contains("db"));
    }

    #[test]
    fn test_config_accepts_snake_case_keys() {
        let config: EncryptionConfig = serde_json::from_str(&format!(
            r#"{{"resources": [{{"resource": "secrets", "group": "", "key_hex": "{}", "key_id": "k1"}}]}}"#,
            "11".repeat(32)
        ))
        .unwrap();
        let binding = config.into_binding().unwrap();
        let transformer = binding.get(&GroupResource::new("secrets", "")).unwrap();
        assert_eq!(transformer.key_id(), "k1");
    }

    #[test]
    fn test_config_into_binding() {
        let config: EncryptionConfig = serde_json::from_str(&format!(
            r#"{{"resources": [{{"resource": "secrets", "keyHex": "{}"}}]}}"#,
            "11".repeat(32)
        ))
        .unwrap();
        let binding = config.into_binding().unwrap();
        assert_eq!(binding.len(), 1);
        assert!(binding.get(&GroupResource::new("secrets", "")).is_some());
    }

    #[test]
    fn test_config_without_key_is_rejected() {
        let config: EncryptionConfig =
            serde_json::from_str(r#"{"resources": [{"resource": "secrets"}]}"#).unwrap();
        assert!(matches!(config.into_binding(), Err(SnapshotError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config: EncryptionConfig =
            serde_json::from_str(r#"{"resources": [{"resource": "secrets", "keyHex": "deadbeef"}]}"#).unwrap();
        assert!(!format!("{:?}", config).contains("deadbeef"));
    }
}
