// Connector handing out the in-memory clients

use parking_lot::Mutex;
use prefect_azure_credentials::{
    AuthMode, AzureCredentials, ClientHandle, Connector, CredentialSettings, ResourceType, Result,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{MemoryBlobStore, MemoryContainerInstances, MemoryCosmos, MemoryMachineLearning};

/// Connector backed by in-memory clients.
///
/// Blob clients requested for an explicit endpoint get their own store per
/// endpoint; see [`MemoryConnector::blob_for`].
#[derive(Default)]
pub struct MemoryConnector {
    blob: MemoryBlobStore,
    blob_by_endpoint: Mutex<HashMap<String, MemoryBlobStore>>,
    cosmos: MemoryCosmos,
    ml: MemoryMachineLearning,
    aci: MemoryContainerInstances,
    connects: Mutex<HashMap<ResourceType, usize>>,
}

impl MemoryConnector {
    /// Create a connector with empty services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default blob store.
    pub fn blob(&self) -> &MemoryBlobStore {
        &self.blob
    }

    /// Blob store for an endpoint, created on first access.
    pub fn blob_for(&self, endpoint: &str) -> MemoryBlobStore {
        self.blob_by_endpoint
            .lock()
            .entry(endpoint.trim_end_matches('/').to_string())
            .or_default()
            .clone()
    }

    /// Cosmos DB account.
    pub fn cosmos(&self) -> &MemoryCosmos {
        &self.cosmos
    }

    /// Azure ML workspace.
    pub fn ml(&self) -> &MemoryMachineLearning {
        &self.ml
    }

    /// Container Instances.
    pub fn container_instances(&self) -> &MemoryContainerInstances {
        &self.aci
    }

    /// Number of times a client was built for `resource`.
    pub fn connect_count(&self, resource: ResourceType) -> usize {
        self.connects.lock().get(&resource).copied().unwrap_or(0)
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        _settings: &CredentialSettings,
        _auth: AuthMode,
        resource: ResourceType,
        endpoint: Option<&str>,
    ) -> Result<ClientHandle> {
        *self.connects.lock().entry(resource).or_insert(0) += 1;

        Ok(match resource {
            ResourceType::BlobStorage => match endpoint {
                Some(endpoint) => ClientHandle::BlobStorage(Arc::new(self.blob_for(endpoint))),
                None => ClientHandle::BlobStorage(Arc::new(self.blob.clone())),
            },
            ResourceType::CosmosDb => ClientHandle::CosmosDb(Arc::new(self.cosmos.clone())),
            ResourceType::MachineLearning => {
                ClientHandle::MachineLearning(Arc::new(self.ml.clone()))
            }
            ResourceType::ContainerInstance => {
                ClientHandle::ContainerInstance(Arc::new(self.aci.clone()))
            }
        })
    }
}

/// Settings that satisfy every resource type.
pub fn identity_settings() -> CredentialSettings {
    CredentialSettings::builder()
        .managed_identity()
        .account_url("https://testaccount.blob.core.windows.net")
        .cosmos_endpoint("https://testaccount.documents.azure.com:443/")
        .subscription_id("00000000-0000-0000-0000-000000000000")
        .resource_group("test-rg")
        .workspace_name("test-ws")
        .build()
}

/// Credentials backed by a fresh [`MemoryConnector`].
pub fn memory_credentials() -> (Arc<AzureCredentials>, Arc<MemoryConnector>) {
    memory_credentials_with(identity_settings())
}

/// Credentials from `settings` backed by a fresh [`MemoryConnector`].
///
/// # Panics
///
/// Panics if the settings do not validate.
pub fn memory_credentials_with(
    settings: CredentialSettings,
) -> (Arc<AzureCredentials>, Arc<MemoryConnector>) {
    let connector = Arc::new(MemoryConnector::new());
    let credentials = AzureCredentials::new(settings)
        .expect("test credential settings must validate")
        .with_connector(connector.clone());
    (Arc::new(credentials), connector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connects_once_per_resource() {
        let (credentials, connector) = memory_credentials();

        credentials.blob_client().unwrap();
        credentials.blob_client().unwrap();
        credentials.cosmos_client().unwrap();

        assert_eq!(connector.connect_count(ResourceType::BlobStorage), 1);
        assert_eq!(connector.connect_count(ResourceType::CosmosDb), 1);
        assert_eq!(connector.connect_count(ResourceType::MachineLearning), 0);
    }

    #[test]
    fn test_blob_for_endpoint_is_separate() {
        let (credentials, connector) = memory_credentials();
        let other = "https://other.blob.core.windows.net";

        credentials.blob_client_for(other).unwrap();
        connector.blob_for(other).insert("c", "b", "x");

        assert!(connector.blob().get("c", "b").is_none());
        assert!(connector.blob_for(other).get("c", "b").is_some());
    }
}
