//! Azure ML workspace block.

use prefect_azure_blob::fs::walk_files;
use prefect_azure_blob::validation::{
    DEFAULT_MAX_UPLOAD_SIZE, check_upload_size, join_blob_path, validate_container_name,
};
use prefect_azure_credentials::{
    AzureCredentials, AzureError, BlobApi, BlobDatastoreRegistration, Datastore,
    MachineLearningApi, Result,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::account::BlobAccount;

/// Datastore type of blob-container datastores.
pub const BLOB_DATASTORE_TYPE: &str = "AzureBlob";

/// An Azure ML workspace bound to credentials.
///
/// The workspace is identified by the credential's subscription, resource
/// group and workspace name.
#[derive(Debug, Clone)]
pub struct MlWorkspace {
    credentials: Arc<AzureCredentials>,
    max_upload_size: u64,
}

impl MlWorkspace {
    /// Create a block for the credential's workspace.
    pub fn new(credentials: Arc<AzureCredentials>) -> Self {
        Self {
            credentials,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }

    /// Set the per-file upload limit.
    pub fn max_upload_size(mut self, bytes: u64) -> Self {
        self.max_upload_size = bytes;
        self
    }

    /// Get the credentials.
    pub fn credentials(&self) -> &Arc<AzureCredentials> {
        &self.credentials
    }

    fn client(&self) -> Result<Arc<dyn MachineLearningApi>> {
        self.credentials.ml_client()
    }

    /// List every datastore in the workspace.
    pub async fn list_datastores(&self) -> Result<Vec<Datastore>> {
        let client = self.client()?;
        info!(workspace = ?self.credentials.settings().workspace_name, "Listing datastores");
        client.list_datastores().await
    }

    /// Get a datastore by name, or the workspace default.
    pub async fn get_datastore(&self, name: Option<&str>) -> Result<Datastore> {
        let client = self.client()?;
        info!(
            workspace = ?self.credentials.settings().workspace_name,
            datastore = name.unwrap_or("<default>"),
            "Getting datastore"
        );
        client.get_datastore(name).await
    }

    /// Upload a file or directory tree to a blob datastore.
    ///
    /// Blob names are `target_path` joined with each file's path relative to
    /// `path`. Returns the uploaded blob names.
    pub async fn upload_to_datastore(
        &self,
        path: &Path,
        datastore_name: Option<&str>,
        target_path: Option<&str>,
        overwrite: bool,
    ) -> Result<Vec<String>> {
        let metadata = tokio::fs::metadata(path).await?;

        let files = if metadata.is_dir() {
            walk_files(path)
                .await?
                .into_iter()
                .map(|f| (f.path, f.relative))
                .collect::<Vec<_>>()
        } else {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    AzureError::invalid_input(format!("'{}' has no file name", path.display()))
                })?;
            vec![(path.to_path_buf(), file_name)]
        };
        if files.is_empty() {
            return Err(AzureError::invalid_input(format!(
                "no files to upload in '{}'",
                path.display()
            )));
        }
        for (file, _) in &files {
            check_upload_size(tokio::fs::metadata(file).await?.len(), self.max_upload_size)?;
        }

        let datastore = self.get_datastore(datastore_name).await?;
        let (container, client) = self.datastore_blob_client(&datastore)?;

        info!(
            datastore = %datastore.name,
            container = %container,
            count = files.len(),
            "Uploading to datastore"
        );

        let mut uploaded = Vec::with_capacity(files.len());
        for (file, relative) in files {
            let blob = join_blob_path(&[target_path.unwrap_or(""), &relative]);
            let data = tokio::fs::read(&file).await?;
            client.upload(&container, &blob, data.into(), overwrite).await?;
            debug!(from = %file.display(), blob = %blob, "Uploaded file");
            uploaded.push(blob);
        }
        Ok(uploaded)
    }

    fn datastore_blob_client(&self, datastore: &Datastore) -> Result<(String, Arc<dyn BlobApi>)> {
        if datastore.datastore_type != BLOB_DATASTORE_TYPE {
            return Err(AzureError::invalid_input(format!(
                "datastore '{}' is of type '{}', not {}",
                datastore.name, datastore.datastore_type, BLOB_DATASTORE_TYPE
            )));
        }
        let container = datastore.container_name.clone().ok_or_else(|| {
            AzureError::invalid_input(format!("datastore '{}' has no container", datastore.name))
        })?;
        let account_url = datastore.account_url().ok_or_else(|| {
            AzureError::invalid_input(format!(
                "datastore '{}' has no storage account",
                datastore.name
            ))
        })?;
        Ok((container, self.credentials.blob_client_for(&account_url)?))
    }

    /// Register a blob container as a datastore.
    ///
    /// The datastore name defaults to the container name. An existing
    /// datastore is returned unchanged unless `overwrite` is set.
    pub async fn register_blob_container(
        &self,
        container_name: &str,
        blob_credentials: &AzureCredentials,
        datastore_name: Option<&str>,
        overwrite: bool,
        set_as_default: bool,
    ) -> Result<Datastore> {
        validate_container_name(container_name)?;
        let datastore_name = datastore_name.unwrap_or(container_name);
        let account = BlobAccount::from_credentials(blob_credentials)?;
        let client = self.client()?;

        if !overwrite {
            match client.get_datastore(Some(datastore_name)).await {
                Ok(existing) => {
                    info!(datastore = %datastore_name, "Datastore already registered");
                    return Ok(existing);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        info!(
            datastore = %datastore_name,
            account = %account.name,
            container = %container_name,
            account_key = account.has_key(),
            set_as_default,
            "Registering blob container datastore"
        );

        let registration = BlobDatastoreRegistration {
            datastore_name: datastore_name.to_string(),
            account_name: account.name,
            container_name: container_name.to_string(),
            endpoint: account.endpoint,
            protocol: account.protocol,
            account_key: account.key,
            set_as_default,
        };
        client.register_blob_datastore(&registration).await
    }
}
