//! # Prefect Azure Credentials
//!
//! Azure credential block: validated authentication settings plus a lazily
//! populated cache of service clients.
//!
//! ## Features
//!
//! Blob Storage and Cosmos DB clients come from the Azure SDK and are
//! compiled only with the `blob` and `cosmos` features. Azure Machine
//! Learning and Container Instances go through the Resource Manager REST API
//! and are always available.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prefect_azure_credentials::{AzureCredentials, CredentialSettings, ResourceType};
//!
//! let settings = CredentialSettings::builder()
//!     .service_principal("tenant", "client", "secret")
//!     .subscription_id("00000000-0000-0000-0000-000000000000")
//!     .build();
//!
//! // Validated here, no network call
//! let credentials = AzureCredentials::new(settings)?;
//!
//! // Built on first use, then cached
//! let aci = credentials.container_instance_client()?;
//! let same = credentials.get_client(ResourceType::ContainerInstance)?;
//! ```
//!
//! ## Emulators and Tests
//!
//! [`AzureCredentials::with_connector`] swaps the client factory, e.g. for
//! Azurite or for in-memory clients.

pub mod arm;
pub mod clients;
mod connection_string;
mod connector;
mod credentials;
mod error;
#[cfg(feature = "auth")]
pub mod sdk;
pub mod secret;
mod settings;
mod token;

pub use clients::{
    BlobApi, BlobDatastoreRegistration, BlobItem, ClientHandle, ContainerGroupRef,
    ContainerGroupSpec, ContainerGroupStatus, ContainerInstanceApi, ContainerSpec, CosmosApi,
    CosmosQuery, Datastore, EnvironmentVariable, GpuResource, ImageRegistryCredential,
    MachineLearningApi, QueryParameter, partition_key_value,
};
pub use connection_string::{
    ConnectionString, EMULATOR_ACCOUNT, EMULATOR_ACCOUNT_KEY, account_from_url,
};
pub use connector::{AzureConnector, Connector};
pub use credentials::{AzureCredentials, ResourceType};
pub use error::{AzureError, Result, parse_retry_after};
pub use settings::{
    AuthMode, CredentialSettings, CredentialSettingsBuilder, DEFAULT_AUTHORITY_HOST,
    DEFAULT_MANAGEMENT_ENDPOINT,
};
pub use token::{MANAGEMENT_SCOPE, StaticTokenSource, TokenSource};

#[cfg(feature = "auth")]
pub use token::{IdentityTokenSource, identity_credential};

// Re-export secret types used in public fields
pub use secrecy::{ExposeSecret, SecretString};

// Re-export Azure SDK crates
#[cfg(feature = "auth")]
pub use azure_core;

#[cfg(feature = "auth")]
pub use azure_identity;

#[cfg(feature = "blob")]
pub use azure_storage_blobs;

#[cfg(feature = "cosmos")]
pub use azure_data_cosmos;
