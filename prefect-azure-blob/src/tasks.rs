//! Standalone Blob Storage tasks.

use bytes::Bytes;
use prefect_azure_credentials::{AzureCredentials, BlobItem, Result};
use std::sync::Arc;
use tracing::info;

use crate::BlobStorageContainer;

/// Download a blob.
pub async fn blob_storage_download(
    credentials: &Arc<AzureCredentials>,
    container: &str,
    blob: &str,
) -> Result<Bytes> {
    info!(container = %container, blob = %blob, "Downloading blob from container");
    BlobStorageContainer::new(credentials.clone(), container)?
        .download(blob)
        .await
}

/// Upload data to a blob. A missing blob name gets a random UUID.
///
/// Returns the blob name.
pub async fn blob_storage_upload(
    data: impl Into<Bytes>,
    credentials: &Arc<AzureCredentials>,
    container: &str,
    blob: Option<&str>,
    overwrite: bool,
) -> Result<String> {
    let blob = blob
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(container = %container, blob = %blob, "Uploading blob to container");
    BlobStorageContainer::new(credentials.clone(), container)?
        .upload(&blob, data, overwrite)
        .await?;
    Ok(blob)
}

/// List blobs in a container, optionally by name prefix.
pub async fn blob_storage_list(
    credentials: &Arc<AzureCredentials>,
    container: &str,
    prefix: Option<&str>,
) -> Result<Vec<BlobItem>> {
    info!(container = %container, "Listing blobs in container");
    BlobStorageContainer::new(credentials.clone(), container)?
        .list(prefix)
        .await
}
