//! Blob Storage container block.

use bytes::Bytes;
use prefect_azure_credentials::{AzureCredentials, AzureError, BlobApi, BlobItem, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::fs::{walk_files, write_file};
use crate::validation::{
    DEFAULT_MAX_UPLOAD_SIZE, check_upload_size, join_blob_path, validate_base_folder,
    validate_blob_name, validate_container_name,
};

fn default_max_upload_size() -> u64 {
    DEFAULT_MAX_UPLOAD_SIZE
}

/// Persisted fields of a container block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    /// Container name.
    pub container_name: String,
    /// Folder that path-based operations resolve against.
    #[serde(default)]
    pub base_folder: Option<String>,
    /// Maximum upload size in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

impl BlobStorageConfig {
    /// Create a config for a container.
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            base_folder: None,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

/// A blob container bound to credentials.
#[derive(Debug, Clone)]
pub struct BlobStorageContainer {
    credentials: Arc<AzureCredentials>,
    config: BlobStorageConfig,
}

impl BlobStorageContainer {
    /// Create a block for a container.
    pub fn new(credentials: Arc<AzureCredentials>, container_name: impl Into<String>) -> Result<Self> {
        Self::from_config(credentials, BlobStorageConfig::new(container_name))
    }

    /// Create a block from persisted config.
    pub fn from_config(credentials: Arc<AzureCredentials>, config: BlobStorageConfig) -> Result<Self> {
        validate_container_name(&config.container_name)?;
        if let Some(folder) = &config.base_folder {
            validate_base_folder(folder)?;
        }
        Ok(Self {
            credentials,
            config,
        })
    }

    /// Set the base folder.
    pub fn base_folder(mut self, folder: impl Into<String>) -> Result<Self> {
        let folder = folder.into();
        validate_base_folder(&folder)?;
        self.config.base_folder = Some(folder).filter(|f| !f.trim_matches('/').is_empty());
        Ok(self)
    }

    /// Set the maximum upload size.
    pub fn max_upload_size(mut self, bytes: u64) -> Self {
        self.config.max_upload_size = bytes;
        self
    }

    /// Get the config.
    pub fn config(&self) -> &BlobStorageConfig {
        &self.config
    }

    /// Get the container name.
    pub fn container_name(&self) -> &str {
        &self.config.container_name
    }

    /// Get the credentials.
    pub fn credentials(&self) -> &Arc<AzureCredentials> {
        &self.credentials
    }

    fn client(&self) -> Result<Arc<dyn BlobApi>> {
        self.credentials.blob_client()
    }

    /// Resolve a path against the base folder.
    pub fn resolve_path(&self, path: &str) -> String {
        join_blob_path(&[self.config.base_folder.as_deref().unwrap_or(""), path])
    }

    // ========== Blob operations ==========

    /// Upload a blob.
    pub async fn upload(&self, blob: &str, data: impl Into<Bytes>, overwrite: bool) -> Result<()> {
        let data = data.into();
        validate_blob_name(blob)?;
        check_upload_size(data.len() as u64, self.config.max_upload_size)?;

        info!(
            container = %self.config.container_name,
            blob = %blob,
            size = data.len(),
            overwrite = overwrite,
            "Uploading blob"
        );
        self.client()?
            .upload(&self.config.container_name, blob, data, overwrite)
            .await
    }

    /// Download a blob.
    pub async fn download(&self, blob: &str) -> Result<Bytes> {
        validate_blob_name(blob)?;

        info!(container = %self.config.container_name, blob = %blob, "Downloading blob");
        self.client()?.download(&self.config.container_name, blob).await
    }

    /// List blobs, optionally by name prefix.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobItem>> {
        info!(container = %self.config.container_name, prefix = ?prefix, "Listing blobs");
        self.client()?.list(&self.config.container_name, prefix).await
    }

    /// Delete a blob.
    pub async fn delete(&self, blob: &str) -> Result<()> {
        validate_blob_name(blob)?;

        info!(container = %self.config.container_name, blob = %blob, "Deleting blob");
        self.client()?.delete(&self.config.container_name, blob).await
    }

    // ========== Path-based operations ==========

    /// Read a blob at a path under the base folder.
    pub async fn read_path(&self, path: &str) -> Result<Bytes> {
        self.download(&self.resolve_path(path)).await
    }

    /// Write a blob at a path under the base folder, replacing it.
    ///
    /// Returns the resolved blob name.
    pub async fn write_path(&self, path: &str, content: impl Into<Bytes>) -> Result<String> {
        let blob = self.resolve_path(path);
        self.upload(&blob, content, true).await?;
        Ok(blob)
    }

    /// Upload a local file. Returns the blob name.
    pub async fn upload_from_path(
        &self,
        from_path: &Path,
        to_path: &str,
        overwrite: bool,
    ) -> Result<String> {
        let size = tokio::fs::metadata(from_path).await?.len();
        check_upload_size(size, self.config.max_upload_size)?;

        let data = tokio::fs::read(from_path).await?;
        let blob = self.resolve_path(to_path);
        self.upload(&blob, data, overwrite).await?;

        debug!(from = %from_path.display(), blob = %blob, "Uploaded file");
        Ok(blob)
    }

    /// Download a blob to a local file, creating parent directories.
    pub async fn download_object_to_path(&self, from_path: &str, to_path: &Path) -> Result<PathBuf> {
        let data = self.read_path(from_path).await?;
        write_file(to_path, &data).await?;

        debug!(to = %to_path.display(), size = data.len(), "Downloaded blob to file");
        Ok(to_path.to_path_buf())
    }

    /// Upload every file under a local folder, keeping relative paths.
    ///
    /// Returns the uploaded blob names.
    pub async fn upload_from_folder(
        &self,
        from_folder: &Path,
        to_folder: Option<&str>,
        overwrite: bool,
    ) -> Result<Vec<String>> {
        let files = walk_files(from_folder).await?;
        if files.is_empty() {
            return Err(AzureError::invalid_input(format!(
                "no files to upload in '{}'",
                from_folder.display()
            )));
        }

        // All sizes are checked before the first upload
        for file in &files {
            let size = tokio::fs::metadata(&file.path).await?.len();
            check_upload_size(size, self.config.max_upload_size)?;
        }

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            let target = join_blob_path(&[to_folder.unwrap_or(""), &file.relative]);
            uploaded.push(self.upload_from_path(&file.path, &target, overwrite).await?);
        }

        info!(
            container = %self.config.container_name,
            count = uploaded.len(),
            "Uploaded folder"
        );
        Ok(uploaded)
    }

    /// Download every blob under a folder into a local directory.
    ///
    /// Returns the written paths.
    pub async fn download_folder_to_path(
        &self,
        from_folder: &str,
        to_folder: &Path,
    ) -> Result<Vec<PathBuf>> {
        let folder = self.resolve_path(from_folder);
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{}/", folder)
        };

        let blobs = self
            .list((!prefix.is_empty()).then_some(prefix.as_str()))
            .await?;

        let mut written = Vec::new();
        for item in blobs {
            let relative = item.name.strip_prefix(&prefix).unwrap_or(&item.name);
            // Skip folder markers
            if relative.is_empty() || relative.ends_with('/') {
                continue;
            }

            let data = self.download(&item.name).await?;
            let target = relative
                .split('/')
                .fold(to_folder.to_path_buf(), |path, part| path.join(part));
            write_file(&target, &data).await?;
            written.push(target);
        }

        info!(
            container = %self.config.container_name,
            folder = %folder,
            count = written.len(),
            "Downloaded folder"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefect_azure_testing::memory_credentials;

    #[test]
    fn test_new_rejects_invalid_container() {
        let (credentials, _) = memory_credentials();
        let err = BlobStorageContainer::new(credentials, "Bad_Name").unwrap_err();
        assert!(matches!(err, AzureError::InvalidInput(_)));
    }

    #[test]
    fn test_resolve_path() {
        let (credentials, _) = memory_credentials();
        let block = BlobStorageContainer::new(credentials, "data")
            .unwrap()
            .base_folder("runs/")
            .unwrap();

        assert_eq!(block.resolve_path("a/b.txt"), "runs/a/b.txt");
        assert_eq!(block.resolve_path("/c.txt"), "runs/c.txt");
    }

    #[test]
    fn test_base_folder_rejects_overlong_name() {
        let (credentials, _) = memory_credentials();
        let block = BlobStorageContainer::new(credentials, "data").unwrap();

        let err = block.clone().base_folder("a".repeat(1025)).unwrap_err();
        assert!(matches!(err, AzureError::InvalidInput(_)));

        let block = block.base_folder("a".repeat(1024)).unwrap();
        assert_eq!(block.config().base_folder.as_ref().map(String::len), Some(1024));
    }

    #[test]
    fn test_from_config_rejects_overlong_base_folder() {
        let (credentials, _) = memory_credentials();
        let config = BlobStorageConfig {
            base_folder: Some("f".repeat(1025)),
            ..BlobStorageConfig::new("data")
        };
        let err = BlobStorageContainer::from_config(credentials, config).unwrap_err();
        assert!(matches!(err, AzureError::InvalidInput(_)));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: BlobStorageConfig =
            serde_json::from_value(serde_json::json!({ "container_name": "data" })).unwrap();
        assert_eq!(config.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
        assert_eq!(config.base_folder, None);
    }

    #[tokio::test]
    async fn test_upload_over_limit_never_reaches_service() {
        let (credentials, connector) = memory_credentials();
        connector.blob().create_container("data");
        let block = BlobStorageContainer::new(credentials, "data")
            .unwrap()
            .max_upload_size(4);

        let err = block.upload("big.bin", vec![0u8; 5], false).await.unwrap_err();

        assert!(matches!(err, AzureError::PayloadTooLarge { size: 5, limit: 4 }));
        assert!(!connector.blob().log().was_called("upload"));
    }
}
