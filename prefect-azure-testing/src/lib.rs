//! Testing utilities for prefect-azure blocks.
//!
//! In-memory implementations of the Azure client traits, plus a connector
//! that hands them to [`AzureCredentials`](prefect_azure_credentials::AzureCredentials).
//!
//! ## Quick Start
//!
//! ```
//! use prefect_azure_testing::memory_credentials;
//!
//! # tokio_test::block_on(async {
//! let (credentials, connector) = memory_credentials();
//! connector.blob().create_container("data");
//!
//! let blob = credentials.blob_client().unwrap();
//! blob.upload("data", "hello.txt", "hi".into(), false).await.unwrap();
//!
//! assert_eq!(connector.blob().blob_names("data"), vec!["hello.txt"]);
//! # });
//! ```
//!
//! ## Failure Injection
//!
//! ```
//! use prefect_azure_credentials::AzureError;
//! use prefect_azure_testing::memory_credentials;
//!
//! # tokio_test::block_on(async {
//! let (credentials, connector) = memory_credentials();
//! connector.blob().create_container("data");
//! connector.blob().log().fail_next(
//!     "download",
//!     AzureError::Throttled { message: "ServerBusy".into(), retry_after: None },
//! );
//!
//! let blob = credentials.blob_client().unwrap();
//! assert!(blob.download("data", "x").await.unwrap_err().is_throttled());
//! assert_eq!(connector.blob().log().call_count("download"), 1);
//! # });
//! ```

mod aci;
mod blob;
mod connector;
mod cosmos;
mod failure;
mod ml;

pub use aci::MemoryContainerInstances;
pub use blob::MemoryBlobStore;
pub use connector::{MemoryConnector, identity_settings, memory_credentials, memory_credentials_with};
pub use cosmos::MemoryCosmos;
pub use failure::CallLog;
pub use ml::{MemoryMachineLearning, RecordedRegistration};
