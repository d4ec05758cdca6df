// In-memory Blob Storage

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use prefect_azure_credentials::{AzureError, BlobApi, BlobItem, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::CallLog;

/// In-memory blob service for one account.
///
/// Containers must be created before use, like the real service.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    containers: Arc<RwLock<HashMap<String, BTreeMap<String, Bytes>>>>,
    log: CallLog,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container.
    pub fn create_container(&self, container: &str) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default();
    }

    /// Store a blob directly, creating its container.
    pub fn insert(&self, container: &str, blob: &str, data: impl Into<Bytes>) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .insert(blob.to_string(), data.into());
    }

    /// Read a blob directly.
    pub fn get(&self, container: &str, blob: &str) -> Option<Bytes> {
        self.containers
            .read()
            .get(container)
            .and_then(|blobs| blobs.get(blob).cloned())
    }

    /// Blob names in a container, sorted.
    pub fn blob_names(&self, container: &str) -> Vec<String> {
        self.containers
            .read()
            .get(container)
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Call log and failure injection.
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    fn missing_container(container: &str) -> AzureError {
        AzureError::ResourceNotFound(format!("ContainerNotFound: container '{}'", container))
    }
}

#[async_trait]
impl BlobApi for MemoryBlobStore {
    async fn upload(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        overwrite: bool,
    ) -> Result<()> {
        self.log.enter("upload")?;
        let mut containers = self.containers.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| Self::missing_container(container))?;

        if !overwrite && blobs.contains_key(blob) {
            return Err(AzureError::Conflict(format!(
                "BlobAlreadyExists: '{}/{}'",
                container, blob
            )));
        }
        blobs.insert(blob.to_string(), data);
        Ok(())
    }

    async fn download(&self, container: &str, blob: &str) -> Result<Bytes> {
        self.log.enter("download")?;
        let containers = self.containers.read();
        let blobs = containers
            .get(container)
            .ok_or_else(|| Self::missing_container(container))?;
        blobs.get(blob).cloned().ok_or_else(|| {
            AzureError::ResourceNotFound(format!("BlobNotFound: '{}/{}'", container, blob))
        })
    }

    async fn list(&self, container: &str, prefix: Option<&str>) -> Result<Vec<BlobItem>> {
        self.log.enter("list")?;
        let containers = self.containers.read();
        let blobs = containers
            .get(container)
            .ok_or_else(|| Self::missing_container(container))?;

        Ok(blobs
            .iter()
            .filter(|(name, _)| prefix.is_none_or(|p| name.starts_with(p)))
            .map(|(name, data)| BlobItem::new(name.clone(), data.len() as u64))
            .collect())
    }

    async fn delete(&self, container: &str, blob: &str) -> Result<()> {
        self.log.enter("delete")?;
        let mut containers = self.containers.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| Self::missing_container(container))?;
        blobs
            .remove(blob)
            .map(|_| ())
            .ok_or_else(|| AzureError::ResourceNotFound(format!("BlobNotFound: '{}/{}'", container, blob)))
    }
}
