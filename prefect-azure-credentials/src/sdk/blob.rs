//! Blob Storage client on `azure_storage_blobs`.

use async_trait::async_trait;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::prelude::*;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info};

use super::sdk_error;
use crate::clients::{BlobApi, BlobItem};
use crate::connection_string::account_from_url;
use crate::token::identity_credential;
use crate::{AuthMode, AzureError, CredentialSettings, Result};

/// Blob service client for one storage account.
pub struct SdkBlobClient {
    account: String,
    service: BlobServiceClient,
}

impl SdkBlobClient {
    /// Build a client. No request is made.
    pub fn new(
        settings: &CredentialSettings,
        auth: AuthMode,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let conn_str = settings.parsed_connection_string()?;

        let url = endpoint
            .map(str::to_string)
            .or_else(|| settings.account_url.clone())
            .or_else(|| conn_str.as_ref().and_then(|c| c.blob_service_url()))
            .ok_or_else(|| AzureError::config("no blob service URL configured"))?;
        let account = account_from_url(&url)?;

        let credentials = match (auth, &conn_str) {
            (AuthMode::ConnectionString, Some(cs)) => {
                if let Some(key) = cs.account_key() {
                    StorageCredentials::access_key(account.clone(), key.to_string())
                } else if let Some(sas) = cs.shared_access_signature() {
                    StorageCredentials::sas_token(sas).map_err(sdk_error)?
                } else {
                    return Err(AzureError::config(
                        "connection string has neither AccountKey nor SharedAccessSignature",
                    ));
                }
            }
            _ => StorageCredentials::token_credential(identity_credential(settings, auth)?),
        };

        let location = CloudLocation::Custom {
            account: account.clone(),
            uri: url.trim_end_matches('/').to_string(),
        };
        let service = ClientBuilder::with_location(location, credentials).blob_service_client();

        debug!(account = %account, url = %url, "Blob service client built");
        Ok(Self { account, service })
    }
}

#[async_trait]
impl BlobApi for SdkBlobClient {
    async fn upload(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        overwrite: bool,
    ) -> Result<()> {
        let client = self.service.container_client(container).blob_client(blob);

        if !overwrite {
            match client.get_properties().await.map_err(sdk_error) {
                Ok(_) => {
                    return Err(AzureError::Conflict(format!(
                        "blob '{}/{}' already exists",
                        container, blob
                    )));
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let size = data.len();
        client.put_block_blob(data).await.map_err(sdk_error)?;

        info!(account = %self.account, container = %container, blob = %blob, size = size, "Uploaded blob");
        Ok(())
    }

    async fn download(&self, container: &str, blob: &str) -> Result<Bytes> {
        let content = self
            .service
            .container_client(container)
            .blob_client(blob)
            .get_content()
            .await
            .map_err(sdk_error)?;

        debug!(account = %self.account, container = %container, blob = %blob, "Downloaded blob");
        Ok(Bytes::from(content))
    }

    async fn list(&self, container: &str, prefix: Option<&str>) -> Result<Vec<BlobItem>> {
        let mut builder = self.service.container_client(container).list_blobs();
        if let Some(prefix) = prefix {
            builder = builder.prefix(prefix.to_string());
        }

        let mut items = Vec::new();
        let mut stream = builder.into_stream();
        while let Some(page) = stream.next().await {
            let page = page.map_err(sdk_error)?;
            for blob in page.blobs.blobs() {
                items.push(BlobItem::new(
                    blob.name.clone(),
                    blob.properties.content_length,
                ));
            }
        }

        Ok(items)
    }

    async fn delete(&self, container: &str, blob: &str) -> Result<()> {
        self.service
            .container_client(container)
            .blob_client(blob)
            .delete()
            .await
            .map_err(sdk_error)?;

        info!(account = %self.account, container = %container, blob = %blob, "Deleted blob");
        Ok(())
    }
}
