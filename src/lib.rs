// prefect-azure - Azure blocks and a Container Instances worker for workflow orchestration
//
// This library bundles one credential block shared by every Azure service,
// resource blocks for Blob Storage, Cosmos DB and Machine Learning datastores,
// and a worker that runs flow runs as Azure Container Instances.

// Re-export the credential block
pub use prefect_azure_credentials::*;

// Re-export optional crates
#[cfg(feature = "blob")]
pub use prefect_azure_blob as blob;

#[cfg(feature = "cosmos")]
pub use prefect_azure_cosmos as cosmos;

#[cfg(feature = "ml")]
pub use prefect_azure_ml as ml;

#[cfg(feature = "worker")]
pub use prefect_azure_worker as worker;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AuthMode, AzureCredentials, AzureError, CredentialSettings, ExposeSecret, ResourceType,
        Result, SecretString,
    };

    #[cfg(feature = "blob")]
    pub use prefect_azure_blob::{
        BlobStorageConfig, BlobStorageContainer, blob_storage_download, blob_storage_list,
        blob_storage_upload,
    };

    #[cfg(feature = "cosmos")]
    pub use prefect_azure_cosmos::{
        CosmosDbConfig, CosmosDbContainer, CosmosQuery, cosmos_db_create_item,
        cosmos_db_query_items, cosmos_db_read_item,
    };

    #[cfg(feature = "ml")]
    pub use prefect_azure_ml::{
        MlWorkspace, ml_get_datastore, ml_list_datastores, ml_register_datastore_blob_container,
        ml_upload_datastore,
    };

    #[cfg(feature = "worker")]
    pub use prefect_azure_worker::{
        JobConfiguration, JobState, JobSubmission, Orchestrator, Worker, WorkerConfig,
        WorkerError, WorkerResult,
    };
}
