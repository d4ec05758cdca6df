//! # Prefect Azure Blob
//!
//! Blob Storage container block and standalone tasks.
//!
//! Every operation validates names and sizes locally, then delegates to the
//! credential's blob client. Provider errors are returned unchanged.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prefect_azure_blob::BlobStorageContainer;
//! use prefect_azure_credentials::{AzureCredentials, CredentialSettings};
//! use std::sync::Arc;
//!
//! let credentials = Arc::new(AzureCredentials::new(
//!     CredentialSettings::from_env().build(),
//! )?);
//!
//! let block = BlobStorageContainer::new(credentials, "flow-results")?
//!     .base_folder("runs")?;
//!
//! block.write_path("latest.json", br#"{"ok":true}"#.to_vec()).await?;
//! let data = block.read_path("latest.json").await?;
//! ```
//!
//! ## Folders
//!
//! ```rust,ignore
//! block.upload_from_folder(Path::new("./artifacts"), Some("artifacts"), true).await?;
//! block.download_folder_to_path("artifacts", Path::new("/tmp/artifacts")).await?;
//! ```

mod container;
pub mod fs;
mod tasks;
pub mod validation;

pub use container::{BlobStorageConfig, BlobStorageContainer};
pub use tasks::{blob_storage_download, blob_storage_list, blob_storage_upload};
pub use validation::DEFAULT_MAX_UPLOAD_SIZE;

pub use prefect_azure_credentials::BlobItem;
