// In-memory Azure ML workspace

use async_trait::async_trait;
use parking_lot::RwLock;
use prefect_azure_credentials::{
    AzureError, BlobDatastoreRegistration, Datastore, ExposeSecret, MachineLearningApi, Result,
};
use std::sync::Arc;

use crate::CallLog;

/// A registration as received, with the key exposed for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRegistration {
    /// Datastore name.
    pub datastore_name: String,
    /// Container name.
    pub container_name: String,
    /// Storage account.
    pub account_name: String,
    /// Account key, if one was sent.
    pub account_key: Option<String>,
    /// Default flag.
    pub set_as_default: bool,
}

/// In-memory workspace datastores.
#[derive(Clone, Default)]
pub struct MemoryMachineLearning {
    datastores: Arc<RwLock<Vec<Datastore>>>,
    registrations: Arc<RwLock<Vec<RecordedRegistration>>>,
    log: CallLog,
}

impl MemoryMachineLearning {
    /// Create an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blob datastore.
    pub fn add_blob_datastore(&self, name: &str, account: &str, container: &str, is_default: bool) {
        self.datastores.write().push(Datastore {
            name: name.to_string(),
            datastore_type: "AzureBlob".to_string(),
            account_name: Some(account.to_string()),
            container_name: Some(container.to_string()),
            endpoint: Some("core.windows.net".to_string()),
            protocol: Some("https".to_string()),
            is_default,
        });
    }

    /// Registrations received, in order.
    pub fn registrations(&self) -> Vec<RecordedRegistration> {
        self.registrations.read().clone()
    }

    /// Call log and failure injection.
    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl MachineLearningApi for MemoryMachineLearning {
    async fn list_datastores(&self) -> Result<Vec<Datastore>> {
        self.log.enter("list_datastores")?;
        Ok(self.datastores.read().clone())
    }

    async fn get_datastore(&self, name: Option<&str>) -> Result<Datastore> {
        self.log.enter("get_datastore")?;
        let datastores = self.datastores.read();
        let found = match name {
            Some(name) => datastores.iter().find(|d| d.name == name),
            None => datastores.iter().find(|d| d.is_default),
        };
        found.cloned().ok_or_else(|| {
            AzureError::ResourceNotFound(format!(
                "datastore '{}' not found",
                name.unwrap_or("<default>")
            ))
        })
    }

    async fn register_blob_datastore(
        &self,
        registration: &BlobDatastoreRegistration,
    ) -> Result<Datastore> {
        self.log.enter("register_blob_datastore")?;
        self.registrations.write().push(RecordedRegistration {
            datastore_name: registration.datastore_name.clone(),
            container_name: registration.container_name.clone(),
            account_name: registration.account_name.clone(),
            account_key: registration
                .account_key
                .as_ref()
                .map(|k| k.expose_secret().to_string()),
            set_as_default: registration.set_as_default,
        });

        let datastore = Datastore {
            name: registration.datastore_name.clone(),
            datastore_type: "AzureBlob".to_string(),
            account_name: Some(registration.account_name.clone()),
            container_name: Some(registration.container_name.clone()),
            endpoint: Some(registration.endpoint.clone()),
            protocol: Some(registration.protocol.clone()),
            is_default: registration.set_as_default,
        };

        let mut datastores = self.datastores.write();
        if registration.set_as_default {
            for existing in datastores.iter_mut() {
                existing.is_default = false;
            }
        }
        datastores.retain(|d| d.name != datastore.name);
        datastores.push(datastore.clone());
        Ok(datastore)
    }
}
