//! Standalone Azure ML datastore tasks.

use prefect_azure_credentials::{AzureCredentials, Datastore, Result};
use std::path::Path;
use std::sync::Arc;

use crate::MlWorkspace;

/// List the datastores of the credential's workspace.
pub async fn ml_list_datastores(credentials: &Arc<AzureCredentials>) -> Result<Vec<Datastore>> {
    MlWorkspace::new(credentials.clone()).list_datastores().await
}

/// Get a datastore by name, or the workspace default.
pub async fn ml_get_datastore(
    credentials: &Arc<AzureCredentials>,
    datastore_name: Option<&str>,
) -> Result<Datastore> {
    MlWorkspace::new(credentials.clone())
        .get_datastore(datastore_name)
        .await
}

/// Upload a file or directory to a datastore.
pub async fn ml_upload_datastore(
    path: &Path,
    credentials: &Arc<AzureCredentials>,
    target_path: Option<&str>,
    datastore_name: Option<&str>,
    overwrite: bool,
) -> Result<Vec<String>> {
    MlWorkspace::new(credentials.clone())
        .upload_to_datastore(path, datastore_name, target_path, overwrite)
        .await
}

/// Register a blob container as a datastore.
pub async fn ml_register_datastore_blob_container(
    container_name: &str,
    credentials: &Arc<AzureCredentials>,
    blob_credentials: &AzureCredentials,
    datastore_name: Option<&str>,
    overwrite: bool,
    set_as_default: bool,
) -> Result<Datastore> {
    MlWorkspace::new(credentials.clone())
        .register_blob_container(
            container_name,
            blob_credentials,
            datastore_name,
            overwrite,
            set_as_default,
        )
        .await
}
