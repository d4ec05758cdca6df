//! Azure ML workspace datastores over Resource Manager.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::ArmClient;
use crate::clients::{BlobDatastoreRegistration, Datastore, MachineLearningApi};
use crate::{AzureError, Result};

/// Azure ML API version for datastores.
const ML_API_VERSION: &str = "2023-04-01";

#[derive(Debug, Deserialize)]
struct DatastoreResource {
    name: String,
    #[serde(default)]
    properties: DatastoreProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatastoreProperties {
    #[serde(default)]
    datastore_type: String,
    account_name: Option<String>,
    container_name: Option<String>,
    endpoint: Option<String>,
    protocol: Option<String>,
    #[serde(default)]
    is_default: bool,
}

impl From<DatastoreResource> for Datastore {
    fn from(resource: DatastoreResource) -> Self {
        let p = resource.properties;
        Datastore {
            name: resource.name,
            datastore_type: p.datastore_type,
            account_name: p.account_name,
            container_name: p.container_name,
            endpoint: p.endpoint,
            protocol: p.protocol,
            is_default: p.is_default,
        }
    }
}

/// Datastore client for one workspace.
#[derive(Debug, Clone)]
pub struct ArmMachineLearningClient {
    arm: ArmClient,
    subscription_id: String,
    resource_group: String,
    workspace_name: String,
}

impl ArmMachineLearningClient {
    /// Create a client for a workspace.
    pub fn new(
        arm: ArmClient,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        workspace_name: impl Into<String>,
    ) -> Self {
        Self {
            arm,
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            workspace_name: workspace_name.into(),
        }
    }

    fn datastores_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}/datastores",
            self.subscription_id, self.resource_group, self.workspace_name
        )
    }
}

/// Request body for registering a blob datastore.
pub(crate) fn registration_body(registration: &BlobDatastoreRegistration) -> serde_json::Value {
    let credentials = match &registration.account_key {
        Some(key) => json!({
            "credentialsType": "AccountKey",
            "secrets": {
                "secretsType": "AccountKey",
                "key": key.expose_secret(),
            },
        }),
        None => json!({ "credentialsType": "None" }),
    };

    json!({
        "properties": {
            "datastoreType": "AzureBlob",
            "accountName": registration.account_name,
            "containerName": registration.container_name,
            "endpoint": registration.endpoint,
            "protocol": registration.protocol,
            "isDefault": registration.set_as_default,
            "credentials": credentials,
        }
    })
}

#[async_trait]
impl MachineLearningApi for ArmMachineLearningClient {
    async fn list_datastores(&self) -> Result<Vec<Datastore>> {
        let resources: Vec<DatastoreResource> = self
            .arm
            .get_paged(&self.datastores_path(), ML_API_VERSION)
            .await?;
        Ok(resources.into_iter().map(Datastore::from).collect())
    }

    async fn get_datastore(&self, name: Option<&str>) -> Result<Datastore> {
        match name {
            Some(name) => {
                let path = format!("{}/{}", self.datastores_path(), name);
                let resource: DatastoreResource = self.arm.get_json(&path, ML_API_VERSION).await?;
                Ok(resource.into())
            }
            None => self
                .list_datastores()
                .await?
                .into_iter()
                .find(|d| d.is_default)
                .ok_or_else(|| {
                    AzureError::ResourceNotFound(format!(
                        "workspace '{}' has no default datastore",
                        self.workspace_name
                    ))
                }),
        }
    }

    async fn register_blob_datastore(
        &self,
        registration: &BlobDatastoreRegistration,
    ) -> Result<Datastore> {
        let path = format!("{}/{}", self.datastores_path(), registration.datastore_name);
        let resource: DatastoreResource = self
            .arm
            .put_json(&path, ML_API_VERSION, &registration_body(registration))
            .await?;

        info!(
            datastore = %registration.datastore_name,
            container = %registration.container_name,
            workspace = %self.workspace_name,
            "Registered blob container datastore"
        );
        Ok(resource.into())
    }
}
