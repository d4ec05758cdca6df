//! Credential block with a lazily-populated client cache.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::{BlobApi, ClientHandle, ContainerInstanceApi, CosmosApi, MachineLearningApi};
use crate::connector::{AzureConnector, Connector};
use crate::{AuthMode, AzureError, CredentialSettings, Result};

/// Azure resource types a credential can build clients for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Azure Blob Storage.
    BlobStorage,
    /// Azure Cosmos DB.
    CosmosDb,
    /// Azure Machine Learning workspace.
    MachineLearning,
    /// Azure Container Instances.
    ContainerInstance,
}

impl ResourceType {
    /// Get the resource type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::BlobStorage => "blob_storage",
            ResourceType::CosmosDb => "cosmos_db",
            ResourceType::MachineLearning => "machine_learning",
            ResourceType::ContainerInstance => "container_instance",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    resource: ResourceType,
    endpoint: Option<String>,
}

/// Validated Azure credentials.
///
/// Clients are built on first use and cached for the lifetime of the
/// credential. Building a client never touches the network.
pub struct AzureCredentials {
    settings: CredentialSettings,
    auth_mode: AuthMode,
    connector: Arc<dyn Connector>,
    clients: RwLock<HashMap<ClientKey, ClientHandle>>,
}

impl AzureCredentials {
    /// Validate settings and create credentials.
    pub fn new(settings: CredentialSettings) -> Result<Self> {
        let auth_mode = settings.validate()?;

        info!(auth_mode = %auth_mode, "Azure credentials configured");

        Ok(Self {
            settings,
            auth_mode,
            connector: Arc::new(AzureConnector::new()),
            clients: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the client factory.
    ///
    /// Clears any cached clients.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self.clients.get_mut().clear();
        self
    }

    /// Get the settings.
    pub fn settings(&self) -> &CredentialSettings {
        &self.settings
    }

    /// Get the authentication mode.
    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Number of clients built so far.
    pub fn cached_client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Get the client for a resource type, building it on first use.
    pub fn get_client(&self, resource: ResourceType) -> Result<ClientHandle> {
        self.client(resource, None)
    }

    /// Get the client for a resource type at a specific endpoint.
    pub fn get_client_for(&self, resource: ResourceType, endpoint: &str) -> Result<ClientHandle> {
        url::Url::parse(endpoint).map_err(|e| {
            AzureError::config(format!("invalid {} endpoint '{}': {}", resource, endpoint, e))
        })?;
        self.client(resource, Some(endpoint))
    }

    fn client(&self, resource: ResourceType, endpoint: Option<&str>) -> Result<ClientHandle> {
        let key = ClientKey {
            resource,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
        };

        if let Some(handle) = self.clients.read().get(&key) {
            return Ok(handle.clone());
        }

        let mut clients = self.clients.write();
        if let Some(handle) = clients.get(&key) {
            return Ok(handle.clone());
        }

        self.check_requirements(resource, key.endpoint.is_some())?;

        let handle = self.connector.connect(
            &self.settings,
            self.auth_mode,
            resource,
            key.endpoint.as_deref(),
        )?;
        if handle.resource_type() != resource {
            return Err(AzureError::config(format!(
                "connector returned a {} client for {}",
                handle.resource_type(),
                resource
            )));
        }

        debug!(resource = %resource, endpoint = ?key.endpoint, "Client built");
        clients.insert(key, handle.clone());
        Ok(handle)
    }

    fn check_requirements(&self, resource: ResourceType, has_endpoint: bool) -> Result<()> {
        let s = &self.settings;
        let conn_str = self.auth_mode == AuthMode::ConnectionString;

        match resource {
            ResourceType::BlobStorage => {
                if !conn_str && !has_endpoint && s.account_url.is_none() {
                    return Err(AzureError::config(
                        "blob storage requires a connection string or account_url",
                    ));
                }
            }
            ResourceType::CosmosDb => {
                if !conn_str && !has_endpoint && s.cosmos_endpoint.is_none() {
                    return Err(AzureError::config(
                        "cosmos db requires a connection string or cosmos_endpoint",
                    ));
                }
            }
            ResourceType::MachineLearning => {
                if conn_str {
                    return Err(AzureError::config(
                        "machine learning requires service principal or managed identity authentication",
                    ));
                }
                let missing: Vec<&str> = [
                    ("subscription_id", &s.subscription_id),
                    ("resource_group", &s.resource_group),
                    ("workspace_name", &s.workspace_name),
                ]
                .into_iter()
                .filter(|(_, v)| v.as_deref().is_none_or(|v| v.trim().is_empty()))
                .map(|(name, _)| name)
                .collect();
                if !missing.is_empty() {
                    return Err(AzureError::config(format!(
                        "machine learning requires {}",
                        missing.join(", ")
                    )));
                }
            }
            ResourceType::ContainerInstance => {
                if conn_str {
                    return Err(AzureError::config(
                        "container instances require service principal or managed identity authentication",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Get the blob client for the configured account.
    pub fn blob_client(&self) -> Result<Arc<dyn BlobApi>> {
        Self::expect_blob(self.get_client(ResourceType::BlobStorage)?)
    }

    /// Get the blob client for another account URL.
    pub fn blob_client_for(&self, account_url: &str) -> Result<Arc<dyn BlobApi>> {
        Self::expect_blob(self.get_client_for(ResourceType::BlobStorage, account_url)?)
    }

    fn expect_blob(handle: ClientHandle) -> Result<Arc<dyn BlobApi>> {
        match handle {
            ClientHandle::BlobStorage(client) => Ok(client),
            other => Err(wrong_variant(ResourceType::BlobStorage, &other)),
        }
    }

    /// Get the Cosmos DB client.
    pub fn cosmos_client(&self) -> Result<Arc<dyn CosmosApi>> {
        match self.get_client(ResourceType::CosmosDb)? {
            ClientHandle::CosmosDb(client) => Ok(client),
            other => Err(wrong_variant(ResourceType::CosmosDb, &other)),
        }
    }

    /// Get the Azure ML workspace client.
    pub fn ml_client(&self) -> Result<Arc<dyn MachineLearningApi>> {
        match self.get_client(ResourceType::MachineLearning)? {
            ClientHandle::MachineLearning(client) => Ok(client),
            other => Err(wrong_variant(ResourceType::MachineLearning, &other)),
        }
    }

    /// Get the Container Instances client.
    pub fn container_instance_client(&self) -> Result<Arc<dyn ContainerInstanceApi>> {
        match self.get_client(ResourceType::ContainerInstance)? {
            ClientHandle::ContainerInstance(client) => Ok(client),
            other => Err(wrong_variant(ResourceType::ContainerInstance, &other)),
        }
    }
}

fn wrong_variant(expected: ResourceType, handle: &ClientHandle) -> AzureError {
    AzureError::config(format!(
        "expected a {} client, got {}",
        expected,
        handle.resource_type()
    ))
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("auth_mode", &self.auth_mode)
            .field("settings", &self.settings)
            .field("cached_clients", &self.cached_client_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        ContainerGroupRef, ContainerGroupSpec, ContainerGroupStatus, ContainerInstanceApi,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopAci;

    #[async_trait]
    impl ContainerInstanceApi for NoopAci {
        async fn resource_group_location(&self, _: &str, _: &str) -> Result<String> {
            Ok("eastus".to_string())
        }
        async fn create_container_group(
            &self,
            _: &ContainerGroupRef,
            _: &ContainerGroupSpec,
        ) -> Result<()> {
            Ok(())
        }
        async fn container_group_status(
            &self,
            _: &ContainerGroupRef,
        ) -> Result<ContainerGroupStatus> {
            Ok(ContainerGroupStatus::default())
        }
        async fn container_logs(&self, _: &ContainerGroupRef, _: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn delete_container_group(&self, _: &ContainerGroupRef) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        calls: AtomicUsize,
    }

    impl Connector for CountingConnector {
        fn connect(
            &self,
            _settings: &CredentialSettings,
            _auth: AuthMode,
            resource: ResourceType,
            _endpoint: Option<&str>,
        ) -> Result<ClientHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match resource {
                ResourceType::ContainerInstance => Ok(ClientHandle::ContainerInstance(Arc::new(NoopAci))),
                other => Err(AzureError::config(format!("{} not supported here", other))),
            }
        }
    }

    fn identity_credentials(connector: Arc<CountingConnector>) -> AzureCredentials {
        let settings = CredentialSettings::builder().managed_identity().build();
        AzureCredentials::new(settings).unwrap().with_connector(connector)
    }

    #[test]
    fn test_client_is_cached() {
        let connector = Arc::new(CountingConnector::default());
        let credentials = identity_credentials(connector.clone());

        let first = credentials.get_client(ResourceType::ContainerInstance).unwrap();
        let second = credentials.get_client(ResourceType::ContainerInstance).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(credentials.cached_client_count(), 1);
    }

    #[test]
    fn test_connector_error_is_not_cached() {
        let connector = Arc::new(CountingConnector::default());
        let settings = CredentialSettings::builder()
            .managed_identity()
            .cosmos_endpoint("https://acct.documents.azure.com")
            .build();
        let credentials = AzureCredentials::new(settings)
            .unwrap()
            .with_connector(connector.clone());

        assert!(credentials.cosmos_client().is_err());
        assert!(credentials.cosmos_client().is_err());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 2);
        assert_eq!(credentials.cached_client_count(), 0);
    }

    #[test]
    fn test_blob_requires_account_url() {
        let connector = Arc::new(CountingConnector::default());
        let credentials = identity_credentials(connector.clone());

        let err = credentials.blob_client().err().unwrap();
        assert!(err.is_configuration());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ml_requires_workspace_fields() {
        let credentials = identity_credentials(Arc::new(CountingConnector::default()));
        let err = credentials.ml_client().err().unwrap();
        assert!(err.to_string().contains("subscription_id"));
        assert!(err.to_string().contains("workspace_name"));
    }

    #[test]
    fn test_container_instance_rejects_connection_string() {
        let settings = CredentialSettings::builder()
            .connection_string("AccountName=acct;AccountKey=a2V5")
            .build();
        let credentials = AzureCredentials::new(settings)
            .unwrap()
            .with_connector(Arc::new(CountingConnector::default()));

        assert!(credentials.container_instance_client().err().unwrap().is_configuration());
    }

    #[test]
    fn test_get_client_for_rejects_bad_endpoint() {
        let credentials = identity_credentials(Arc::new(CountingConnector::default()));
        let err = credentials
            .get_client_for(ResourceType::BlobStorage, "not a url")
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_resource_type_display() {
        assert_eq!(ResourceType::CosmosDb.to_string(), "cosmos_db");
        assert_eq!(
            serde_json::to_string(&ResourceType::ContainerInstance).unwrap(),
            "\"container_instance\""
        );
    }
}
