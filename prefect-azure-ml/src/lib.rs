//! # Prefect Azure ML
//!
//! Azure Machine Learning workspace block for datastores.
//!
//! ```rust,ignore
//! use prefect_azure_ml::MlWorkspace;
//!
//! let workspace = MlWorkspace::new(credentials);
//!
//! let default = workspace.get_datastore(None).await?;
//! workspace
//!     .upload_to_datastore(Path::new("./data"), None, Some("datasets/v1"), false)
//!     .await?;
//!
//! workspace
//!     .register_blob_container("training", &blob_credentials, None, false, false)
//!     .await?;
//! ```

mod account;
mod tasks;
mod workspace;

pub use tasks::{
    ml_get_datastore, ml_list_datastores, ml_register_datastore_blob_container,
    ml_upload_datastore,
};
pub use workspace::{BLOB_DATASTORE_TYPE, MlWorkspace};

pub use prefect_azure_credentials::Datastore;
