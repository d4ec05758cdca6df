//! Service client traits and the values they exchange.
//!
//! Resource blocks only talk to these traits. The SDK-backed and ARM-backed
//! implementations live in [`crate::sdk`] and [`crate::arm`].

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{ResourceType, Result};

// ============================================================================
// Blob Storage
// ============================================================================

/// A blob returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobItem {
    /// Blob name (full path within the container).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type, if recorded.
    pub content_type: Option<String>,
}

impl BlobItem {
    /// Create a blob item.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            content_type: None,
        }
    }
}

/// Blob service operations for one storage account.
#[async_trait]
pub trait BlobApi: Send + Sync {
    /// Upload a block blob. Fails with `Conflict` if it exists and
    /// `overwrite` is false.
    async fn upload(&self, container: &str, blob: &str, data: Bytes, overwrite: bool)
    -> Result<()>;

    /// Download a blob's contents.
    async fn download(&self, container: &str, blob: &str) -> Result<Bytes>;

    /// List blobs, optionally restricted to a name prefix.
    async fn list(&self, container: &str, prefix: Option<&str>) -> Result<Vec<BlobItem>>;

    /// Delete a blob.
    async fn delete(&self, container: &str, blob: &str) -> Result<()>;
}

// ============================================================================
// Cosmos DB
// ============================================================================

/// A named query parameter (`@name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    /// Parameter name, including the leading `@`.
    pub name: String,
    /// Parameter value.
    pub value: serde_json::Value,
}

/// A Cosmos DB SQL query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CosmosQuery {
    /// SQL text.
    pub query: String,
    /// Named parameters.
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
    /// Restrict the query to one logical partition.
    #[serde(default)]
    pub partition_key: Option<serde_json::Value>,
    /// Allow fan-out across partitions.
    #[serde(default)]
    pub enable_cross_partition_query: bool,
}

impl CosmosQuery {
    /// Create a query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Add a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Restrict to a partition.
    pub fn partition_key(mut self, key: impl Into<serde_json::Value>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Allow cross-partition fan-out.
    pub fn cross_partition(mut self) -> Self {
        self.enable_cross_partition_query = true;
        self
    }
}

/// Value at a container's partition key path (`/a/b`) inside a document.
///
/// Missing segments yield `null`, which Cosmos DB treats as its own key.
pub fn partition_key_value(body: &serde_json::Value, path: &str) -> serde_json::Value {
    path.trim_start_matches('/')
        .split('/')
        .try_fold(body, |current, segment| current.get(segment))
        .cloned()
        .unwrap_or(serde_json::Value::Null)
}

/// Cosmos DB item operations.
#[async_trait]
pub trait CosmosApi: Send + Sync {
    /// Run a query and collect every page.
    async fn query_items(
        &self,
        database: &str,
        container: &str,
        query: &CosmosQuery,
    ) -> Result<Vec<serde_json::Value>>;

    /// Read one item by id and partition key.
    async fn read_item(
        &self,
        database: &str,
        container: &str,
        item_id: &str,
        partition_key: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Create an item and return the stored document.
    ///
    /// Without `partition_key` the key is read from `body` at the
    /// container's partition key path.
    async fn create_item(
        &self,
        database: &str,
        container: &str,
        body: serde_json::Value,
        partition_key: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value>;
}

// ============================================================================
// Azure Machine Learning
// ============================================================================

/// An Azure ML datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    /// Datastore name.
    pub name: String,
    /// Datastore type (`AzureBlob`, `AzureFile`, ...).
    pub datastore_type: String,
    /// Backing storage account.
    pub account_name: Option<String>,
    /// Backing blob container.
    pub container_name: Option<String>,
    /// Storage endpoint suffix.
    pub endpoint: Option<String>,
    /// Storage protocol.
    pub protocol: Option<String>,
    /// Whether this is the workspace default.
    pub is_default: bool,
}

impl Datastore {
    /// Blob service URL of the backing account, for blob datastores.
    pub fn account_url(&self) -> Option<String> {
        let account = self.account_name.as_deref()?;
        Some(format!(
            "{}://{}.blob.{}",
            self.protocol.as_deref().unwrap_or("https"),
            account,
            self.endpoint.as_deref().unwrap_or("core.windows.net")
        ))
    }
}

/// Registration of a blob container as a datastore.
#[derive(Debug)]
pub struct BlobDatastoreRegistration {
    /// Datastore name.
    pub datastore_name: String,
    /// Storage account.
    pub account_name: String,
    /// Blob container.
    pub container_name: String,
    /// Endpoint suffix.
    pub endpoint: String,
    /// Protocol.
    pub protocol: String,
    /// Account key; `None` registers an identity-based datastore.
    pub account_key: Option<SecretString>,
    /// Make this the workspace default.
    pub set_as_default: bool,
}

/// Azure ML workspace datastore operations.
#[async_trait]
pub trait MachineLearningApi: Send + Sync {
    /// List every datastore in the workspace.
    async fn list_datastores(&self) -> Result<Vec<Datastore>>;

    /// Get a datastore by name, or the workspace default for `None`.
    async fn get_datastore(&self, name: Option<&str>) -> Result<Datastore>;

    /// Create or update a blob-container datastore.
    async fn register_blob_datastore(
        &self,
        registration: &BlobDatastoreRegistration,
    ) -> Result<Datastore>;
}

// ============================================================================
// Azure Container Instances
// ============================================================================

/// Identifies a container group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerGroupRef {
    /// Subscription id.
    pub subscription_id: String,
    /// Resource group.
    pub resource_group: String,
    /// Container group name.
    pub name: String,
}

impl ContainerGroupRef {
    /// Create a reference.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }

    /// Resource Manager path of the group.
    pub fn resource_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerInstance/containerGroups/{}",
            self.subscription_id, self.resource_group, self.name
        )
    }
}

impl std::fmt::Display for ContainerGroupRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.name)
    }
}

/// GPU request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuResource {
    /// Number of GPUs.
    pub count: u32,
    /// GPU SKU (`K80`, `P100`, `V100`).
    pub sku: String,
}

/// Container environment variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    /// Name.
    pub name: String,
    /// Value.
    pub value: String,
    /// Send as `secureValue`, hidden from the portal.
    #[serde(default)]
    pub secure: bool,
}

/// Private registry credentials.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageRegistryCredential {
    /// Registry server.
    pub server: String,
    /// Username.
    pub username: String,
    /// Password.
    #[serde(with = "crate::secret::required")]
    pub password: SecretString,
}

impl Clone for ImageRegistryCredential {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            username: self.username.clone(),
            password: crate::secret::duplicate(&self.password),
        }
    }
}

/// One container in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command override.
    pub command: Vec<String>,
    /// Environment.
    pub env: Vec<EnvironmentVariable>,
    /// CPU cores requested.
    pub cpu: f64,
    /// Memory requested, in GB.
    pub memory_gb: f64,
    /// GPU request.
    pub gpu: Option<GpuResource>,
}

/// A container group to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerGroupSpec {
    /// Azure region.
    pub location: String,
    /// The container to run.
    pub container: ContainerSpec,
    /// Private registry credentials.
    pub image_registry: Option<ImageRegistryCredential>,
    /// User-assigned identity resource ids.
    pub identities: Vec<String>,
    /// Subnet resource ids.
    pub subnet_ids: Vec<String>,
    /// DNS servers.
    pub dns_servers: Vec<String>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
}

/// Observed state of a container group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerGroupStatus {
    /// ARM provisioning state (`Creating`, `Succeeded`, `Failed`, ...).
    pub provisioning_state: String,
    /// Container state (`Waiting`, `Running`, `Terminated`).
    pub container_state: Option<String>,
    /// Exit code once terminated.
    pub exit_code: Option<i32>,
    /// Provider detail.
    pub detail: Option<String>,
}

/// Azure Container Instances operations.
#[async_trait]
pub trait ContainerInstanceApi: Send + Sync {
    /// Location of a resource group.
    async fn resource_group_location(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<String>;

    /// Create (or replace) a container group.
    async fn create_container_group(
        &self,
        group: &ContainerGroupRef,
        spec: &ContainerGroupSpec,
    ) -> Result<()>;

    /// Observe a container group.
    async fn container_group_status(&self, group: &ContainerGroupRef)
    -> Result<ContainerGroupStatus>;

    /// Fetch the logs of one container.
    async fn container_logs(&self, group: &ContainerGroupRef, container: &str) -> Result<String>;

    /// Delete a container group.
    async fn delete_container_group(&self, group: &ContainerGroupRef) -> Result<()>;
}

// ============================================================================
// Client Handle
// ============================================================================

/// A built client bound to one credential.
#[derive(Clone)]
pub enum ClientHandle {
    /// Blob service client.
    BlobStorage(Arc<dyn BlobApi>),
    /// Cosmos DB client.
    CosmosDb(Arc<dyn CosmosApi>),
    /// Azure ML workspace client.
    MachineLearning(Arc<dyn MachineLearningApi>),
    /// Container Instances client.
    ContainerInstance(Arc<dyn ContainerInstanceApi>),
}

impl ClientHandle {
    /// The resource type this handle serves.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ClientHandle::BlobStorage(_) => ResourceType::BlobStorage,
            ClientHandle::CosmosDb(_) => ResourceType::CosmosDb,
            ClientHandle::MachineLearning(_) => ResourceType::MachineLearning,
            ClientHandle::ContainerInstance(_) => ResourceType::ContainerInstance,
        }
    }

    /// Whether two handles share the same underlying client.
    pub fn ptr_eq(&self, other: &ClientHandle) -> bool {
        match (self, other) {
            (ClientHandle::BlobStorage(a), ClientHandle::BlobStorage(b)) => Arc::ptr_eq(a, b),
            (ClientHandle::CosmosDb(a), ClientHandle::CosmosDb(b)) => Arc::ptr_eq(a, b),
            (ClientHandle::MachineLearning(a), ClientHandle::MachineLearning(b)) => {
                Arc::ptr_eq(a, b)
            }
            (ClientHandle::ContainerInstance(a), ClientHandle::ContainerInstance(b)) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientHandle")
            .field(&self.resource_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosmos_query_builder() {
        let query = CosmosQuery::new("SELECT * FROM c WHERE c.age >= @age")
            .param("@age", 44)
            .partition_key("tenant-a")
            .cross_partition();

        assert_eq!(query.parameters.len(), 1);
        assert_eq!(query.parameters[0].value, serde_json::json!(44));
        assert_eq!(query.partition_key, Some(serde_json::json!("tenant-a")));
        assert!(query.enable_cross_partition_query);
    }

    #[test]
    fn test_partition_key_value() {
        let body = serde_json::json!({
            "id": "1",
            "lastname": "Smith",
            "address": { "city": "Oslo" }
        });
        assert_eq!(partition_key_value(&body, "/lastname"), "Smith");
        assert_eq!(partition_key_value(&body, "/address/city"), "Oslo");
        assert_eq!(partition_key_value(&body, "/id"), "1");
        assert!(partition_key_value(&body, "/tenant").is_null());
        assert!(partition_key_value(&body, "/address/zip/code").is_null());
    }

    #[test]
    fn test_datastore_account_url() {
        let datastore = Datastore {
            name: "workspaceblobstore".to_string(),
            datastore_type: "AzureBlob".to_string(),
            account_name: Some("mlacct".to_string()),
            container_name: Some("azureml".to_string()),
            endpoint: None,
            protocol: None,
            is_default: true,
        };
        assert_eq!(
            datastore.account_url().as_deref(),
            Some("https://mlacct.blob.core.windows.net")
        );
    }

    #[test]
    fn test_container_group_resource_path() {
        let group = ContainerGroupRef::new("sub", "rg", "flow-abc");
        assert_eq!(
            group.resource_path(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ContainerInstance/containerGroups/flow-abc"
        );
        assert_eq!(group.to_string(), "rg/flow-abc");
    }
}
