//! Client factories.

use std::sync::Arc;
use tracing::info;

use crate::arm::{ArmClient, ArmContainerInstanceClient, ArmMachineLearningClient};
use crate::clients::ClientHandle;
use crate::token::TokenSource;
#[allow(unused_imports)]
use crate::{AuthMode, AzureError, CredentialSettings, ResourceType, Result};

/// Builds service clients from validated settings.
///
/// Implementations must not perform network I/O in `connect`.
pub trait Connector: Send + Sync {
    /// Build a client for `resource`, optionally at an endpoint override.
    fn connect(
        &self,
        settings: &CredentialSettings,
        auth: AuthMode,
        resource: ResourceType,
        endpoint: Option<&str>,
    ) -> Result<ClientHandle>;
}

/// Default connector backed by the Azure SDK and Resource Manager REST.
#[derive(Default)]
pub struct AzureConnector {
    token_source: Option<Arc<dyn TokenSource>>,
}

impl AzureConnector {
    /// Create a connector that derives tokens from the credential.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector that uses a fixed token source for Resource Manager calls.
    pub fn with_token_source(token_source: Arc<dyn TokenSource>) -> Self {
        Self {
            token_source: Some(token_source),
        }
    }

    fn token_source(&self, settings: &CredentialSettings, auth: AuthMode) -> Result<Arc<dyn TokenSource>> {
        if let Some(source) = &self.token_source {
            return Ok(source.clone());
        }

        #[cfg(feature = "auth")]
        {
            let credential = crate::token::identity_credential(settings, auth)?;
            Ok(Arc::new(crate::token::IdentityTokenSource::new(credential)))
        }

        #[cfg(not(feature = "auth"))]
        {
            let _ = (settings, auth);
            Err(AzureError::not_enabled("auth"))
        }
    }

    fn arm_client(
        &self,
        settings: &CredentialSettings,
        auth: AuthMode,
        endpoint: Option<&str>,
    ) -> Result<ArmClient> {
        let base_url = endpoint.unwrap_or(settings.management_endpoint());
        ArmClient::new(base_url, self.token_source(settings, auth)?)
    }
}

impl Connector for AzureConnector {
    fn connect(
        &self,
        settings: &CredentialSettings,
        auth: AuthMode,
        resource: ResourceType,
        endpoint: Option<&str>,
    ) -> Result<ClientHandle> {
        let handle = match resource {
            #[cfg(feature = "blob")]
            ResourceType::BlobStorage => ClientHandle::BlobStorage(Arc::new(
                crate::sdk::blob::SdkBlobClient::new(settings, auth, endpoint)?,
            )),
            #[cfg(not(feature = "blob"))]
            ResourceType::BlobStorage => return Err(AzureError::not_enabled("blob")),

            #[cfg(feature = "cosmos")]
            ResourceType::CosmosDb => ClientHandle::CosmosDb(Arc::new(
                crate::sdk::cosmos::SdkCosmosClient::new(settings, auth, endpoint)?,
            )),
            #[cfg(not(feature = "cosmos"))]
            ResourceType::CosmosDb => return Err(AzureError::not_enabled("cosmos")),

            ResourceType::MachineLearning => {
                let arm = self.arm_client(settings, auth, endpoint)?;
                ClientHandle::MachineLearning(Arc::new(ArmMachineLearningClient::new(
                    arm,
                    settings.subscription_id.clone().unwrap_or_default(),
                    settings.resource_group.clone().unwrap_or_default(),
                    settings.workspace_name.clone().unwrap_or_default(),
                )))
            }
            ResourceType::ContainerInstance => {
                let arm = self.arm_client(settings, auth, endpoint)?;
                ClientHandle::ContainerInstance(Arc::new(ArmContainerInstanceClient::new(arm)))
            }
        };

        info!(resource = %resource, auth_mode = %auth, "Azure client initialized");
        Ok(handle)
    }
}

impl std::fmt::Debug for AzureConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureConnector")
            .field("token_source", &self.token_source.is_some())
            .finish()
    }
}
