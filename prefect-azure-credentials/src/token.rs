//! Bearer token sources for Resource Manager calls.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::Result;

/// Scope for Azure Resource Manager tokens.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Supplies OAuth2 bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Get a token valid for `scope`.
    async fn token(&self, scope: &str) -> Result<String>;
}

/// A pre-acquired token (for example from `az account get-access-token`).
pub struct StaticTokenSource {
    token: SecretString,
}

impl StaticTokenSource {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into().into()),
        }
    }
}

impl std::fmt::Debug for StaticTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self, _scope: &str) -> Result<String> {
        Ok(self.token.expose_secret().to_string())
    }
}

#[cfg(feature = "auth")]
pub use identity::{IdentityTokenSource, identity_credential};

#[cfg(feature = "auth")]
mod identity {
    use std::sync::Arc;

    use async_trait::async_trait;
    use azure_core::auth::TokenCredential;
    use azure_identity::{ClientSecretCredential, DefaultAzureCredential, TokenCredentialOptions};

    use super::TokenSource;
    use crate::{AuthMode, AzureError, CredentialSettings, Result};

    /// Build an `azure_identity` credential for a validated settings block.
    pub fn identity_credential(
        settings: &CredentialSettings,
        auth: AuthMode,
    ) -> Result<Arc<dyn TokenCredential>> {
        match auth {
            AuthMode::ServicePrincipal => {
                let authority = url::Url::parse(settings.authority_host())
                    .map_err(|e| AzureError::config(e.to_string()))?;
                let credential = ClientSecretCredential::new(
                    azure_core::new_http_client(),
                    authority,
                    settings.tenant_id.clone().unwrap_or_default(),
                    settings.client_id.clone().unwrap_or_default(),
                    settings.client_secret_value().unwrap_or_default().to_string(),
                );
                Ok(Arc::new(credential))
            }
            AuthMode::ManagedIdentity => {
                // A user-assigned identity is selected through AZURE_CLIENT_ID.
                let credential = DefaultAzureCredential::create(TokenCredentialOptions::default())
                    .map_err(|e| AzureError::config(e.to_string()))?;
                Ok(Arc::new(credential))
            }
            AuthMode::ConnectionString => Err(AzureError::config(
                "connection-string credentials cannot issue Entra ID tokens",
            )),
        }
    }

    /// Token source backed by an `azure_identity` credential.
    pub struct IdentityTokenSource {
        credential: Arc<dyn TokenCredential>,
    }

    impl IdentityTokenSource {
        /// Wrap a credential.
        pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
            Self { credential }
        }
    }

    #[async_trait]
    impl TokenSource for IdentityTokenSource {
        async fn token(&self, scope: &str) -> Result<String> {
            let token = self
                .credential
                .get_token(&[scope])
                .await
                .map_err(|e| AzureError::from_sdk_message(e.to_string()))?;
            Ok(token.token.secret().to_string())
        }
    }
}
