//! Credential settings and validation.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::connection_string::ConnectionString;
use crate::{AzureError, Result};

/// Default Azure Resource Manager endpoint.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Default Microsoft Entra ID authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Authentication mode selected by a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Connection string (account name plus key or SAS).
    ConnectionString,
    /// Service principal with client secret.
    ServicePrincipal,
    /// Managed identity of the host.
    ManagedIdentity,
}

impl AuthMode {
    /// Get the mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::ConnectionString => "connection_string",
            AuthMode::ServicePrincipal => "service_principal",
            AuthMode::ManagedIdentity => "managed_identity",
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw credential block fields, as persisted.
///
/// Nothing here is validated; [`crate::AzureCredentials::new`] does that.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// Storage or Cosmos DB connection string.
    #[serde(default, with = "crate::secret::option")]
    pub connection_string: Option<SecretString>,
    /// Directory (tenant) id of the service principal.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Application (client) id of the service principal.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Client secret of the service principal.
    #[serde(default, with = "crate::secret::option")]
    pub client_secret: Option<SecretString>,
    /// Authenticate with the host's managed identity.
    #[serde(default)]
    pub managed_identity: bool,
    /// Client id of a user-assigned managed identity.
    #[serde(default)]
    pub managed_identity_client_id: Option<String>,
    /// Blob service URL (`https://<account>.blob.core.windows.net`).
    #[serde(default)]
    pub account_url: Option<String>,
    /// Cosmos DB account endpoint.
    #[serde(default)]
    pub cosmos_endpoint: Option<String>,
    /// Subscription id.
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Resource group name.
    #[serde(default)]
    pub resource_group: Option<String>,
    /// Azure ML workspace name.
    #[serde(default)]
    pub workspace_name: Option<String>,
    /// Resource Manager endpoint override (sovereign clouds, tests).
    #[serde(default)]
    pub management_endpoint: Option<String>,
    /// Authority host override.
    #[serde(default)]
    pub authority_host: Option<String>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn present_secret(value: &Option<SecretString>) -> bool {
    value
        .as_ref()
        .is_some_and(|v| !v.expose_secret().trim().is_empty())
}

impl CredentialSettings {
    /// Create empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder.
    pub fn builder() -> CredentialSettingsBuilder {
        CredentialSettingsBuilder::new()
    }

    /// Load settings from environment variables.
    pub fn from_env() -> CredentialSettingsBuilder {
        let mut builder = CredentialSettingsBuilder::new();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(conn_str) = var("AZURE_STORAGE_CONNECTION_STRING")
            .or_else(|| var("AZURE_COSMOS_CONNECTION_STRING"))
        {
            builder = builder.connection_string(conn_str);
        }
        if let Some(tenant_id) = var("AZURE_TENANT_ID") {
            builder = builder.tenant_id(tenant_id);
        }
        if let Some(client_id) = var("AZURE_CLIENT_ID") {
            builder = builder.client_id(client_id);
        }
        if let Some(secret) = var("AZURE_CLIENT_SECRET") {
            builder = builder.client_secret(secret);
        }
        if var("AZURE_USE_MANAGED_IDENTITY")
            .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        {
            builder = builder.managed_identity();
        }
        if let Some(url) = var("AZURE_STORAGE_ACCOUNT_URL") {
            builder = builder.account_url(url);
        }
        if let Some(endpoint) = var("AZURE_COSMOS_ENDPOINT") {
            builder = builder.cosmos_endpoint(endpoint);
        }
        if let Some(subscription) = var("AZURE_SUBSCRIPTION_ID") {
            builder = builder.subscription_id(subscription);
        }
        if let Some(group) = var("AZURE_RESOURCE_GROUP") {
            builder = builder.resource_group(group);
        }
        if let Some(workspace) = var("AZURE_ML_WORKSPACE") {
            builder = builder.workspace_name(workspace);
        }

        builder
    }

    /// Validate the settings and return the single authentication mode.
    pub fn validate(&self) -> Result<AuthMode> {
        let mut modes = Vec::new();

        if self.connection_string.is_some() {
            if !present_secret(&self.connection_string) {
                return Err(AzureError::config("connection string is empty"));
            }
            ConnectionString::parse(self.connection_string_secret().unwrap_or_default())?;
            modes.push(AuthMode::ConnectionString);
        }

        let principal_fields = [
            ("tenant_id", present(&self.tenant_id), self.tenant_id.is_some()),
            ("client_id", present(&self.client_id), self.client_id.is_some()),
            (
                "client_secret",
                present_secret(&self.client_secret),
                self.client_secret.is_some(),
            ),
        ];
        let principal_started = principal_fields.iter().any(|(_, _, given)| *given);
        if principal_started {
            let missing: Vec<&str> = principal_fields
                .iter()
                .filter(|(_, ok, _)| !ok)
                .map(|(name, _, _)| *name)
                .collect();
            if !missing.is_empty() {
                return Err(AzureError::config(format!(
                    "service principal authentication requires tenant_id, client_id and client_secret; missing or empty: {}",
                    missing.join(", ")
                )));
            }
            modes.push(AuthMode::ServicePrincipal);
        }

        if self.managed_identity {
            modes.push(AuthMode::ManagedIdentity);
        } else if present(&self.managed_identity_client_id) {
            return Err(AzureError::config(
                "managed_identity_client_id is set but managed_identity is disabled",
            ));
        }

        let mode = match modes.as_slice() {
            [] => {
                return Err(AzureError::config(
                    "no authentication configured: provide a connection string, a service principal (tenant_id, client_id, client_secret) or enable managed_identity",
                ));
            }
            [mode] => *mode,
            many => {
                let names: Vec<&str> = many.iter().map(AuthMode::as_str).collect();
                return Err(AzureError::config(format!(
                    "contradictory authentication: exactly one mode may be configured, found {}",
                    names.join(", ")
                )));
            }
        };

        for (field, value) in [
            ("account_url", &self.account_url),
            ("cosmos_endpoint", &self.cosmos_endpoint),
            ("management_endpoint", &self.management_endpoint),
            ("authority_host", &self.authority_host),
        ] {
            if let Some(value) = value {
                url::Url::parse(value).map_err(|e| {
                    AzureError::config(format!("{} '{}' is not a valid URL: {}", field, value, e))
                })?;
            }
        }

        Ok(mode)
    }

    /// Exposed connection string, if any.
    pub fn connection_string_secret(&self) -> Option<&str> {
        self.connection_string.as_ref().map(|s| s.expose_secret())
    }

    /// Exposed client secret, if any.
    pub fn client_secret_value(&self) -> Option<&str> {
        self.client_secret.as_ref().map(|s| s.expose_secret())
    }

    /// Resource Manager endpoint, falling back to the public cloud.
    pub fn management_endpoint(&self) -> &str {
        self.management_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_MANAGEMENT_ENDPOINT)
    }

    /// Authority host, falling back to the public cloud.
    pub fn authority_host(&self) -> &str {
        self.authority_host.as_deref().unwrap_or(DEFAULT_AUTHORITY_HOST)
    }

    /// Parse the connection string.
    pub fn parsed_connection_string(&self) -> Result<Option<ConnectionString>> {
        self.connection_string_secret()
            .map(ConnectionString::parse)
            .transpose()
    }
}

/// Builder for credential settings.
#[derive(Debug, Default)]
pub struct CredentialSettingsBuilder {
    settings: CredentialSettings,
}

impl CredentialSettingsBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a connection string.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.settings.connection_string = Some(SecretString::new(conn_str.into().into()));
        self
    }

    /// Use a service principal.
    pub fn service_principal(
        self,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.tenant_id(tenant_id)
            .client_id(client_id)
            .client_secret(client_secret)
    }

    /// Set the tenant id.
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.settings.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the client id.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.settings.client_id = Some(client_id.into());
        self
    }

    /// Set the client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.settings.client_secret = Some(SecretString::new(client_secret.into().into()));
        self
    }

    /// Use the system-assigned managed identity.
    pub fn managed_identity(mut self) -> Self {
        self.settings.managed_identity = true;
        self
    }

    /// Use a user-assigned managed identity.
    pub fn user_assigned_identity(mut self, client_id: impl Into<String>) -> Self {
        self.settings.managed_identity = true;
        self.settings.managed_identity_client_id = Some(client_id.into());
        self
    }

    /// Set the blob service URL.
    pub fn account_url(mut self, url: impl Into<String>) -> Self {
        self.settings.account_url = Some(url.into());
        self
    }

    /// Set the Cosmos DB endpoint.
    pub fn cosmos_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.settings.cosmos_endpoint = Some(endpoint.into());
        self
    }

    /// Set the subscription id.
    pub fn subscription_id(mut self, subscription_id: impl Into<String>) -> Self {
        self.settings.subscription_id = Some(subscription_id.into());
        self
    }

    /// Set the resource group.
    pub fn resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.settings.resource_group = Some(resource_group.into());
        self
    }

    /// Set the Azure ML workspace.
    pub fn workspace_name(mut self, workspace_name: impl Into<String>) -> Self {
        self.settings.workspace_name = Some(workspace_name.into());
        self
    }

    /// Override the Resource Manager endpoint.
    pub fn management_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.settings.management_endpoint = Some(endpoint.into());
        self
    }

    /// Override the authority host.
    pub fn authority_host(mut self, host: impl Into<String>) -> Self {
        self.settings.authority_host = Some(host.into());
        self
    }

    /// Build the settings.
    pub fn build(self) -> CredentialSettings {
        self.settings
    }
}
