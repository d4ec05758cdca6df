//! # Prefect Azure Worker
//!
//! Runs flow runs as Azure Container Instances container groups.
//!
//! Each submission becomes one container group. A single polling loop checks
//! every unfinished job, maps the container state onto the job state,
//! reports changes to the [`Orchestrator`], deletes finished groups and
//! archives the job.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prefect_azure_worker::*;
//!
//! prefect_azure_worker::telemetry::init();
//!
//! let worker = Worker::new(credentials, orchestrator, WorkerConfig::from_env()?);
//! worker.start().await?;
//!
//! let job_id = worker
//!     .submit(JobSubmission::new(
//!         flow_run_id,
//!         "crimson-otter",
//!         JobConfiguration::new("prefecthq/prefect:3-latest", subscription_id, "flows-rg")
//!             .env("PREFECT_API_URL", api_url)
//!             .secure_env("PREFECT_API_KEY", api_key),
//!     ))
//!     .await?;
//!
//! worker.cancel(job_id).await?;
//! worker.stop().await?;
//! ```
//!
//! ## Job States
//!
//! `Pending -> Running -> {Succeeded | Failed | Cancelled}`. Pending jobs
//! may finish directly, and finished jobs never change.

pub mod config;
pub mod error;
pub mod job;
pub mod naming;
pub mod orchestrator;
pub mod registry;
pub mod telemetry;
pub mod worker;

pub use config::{JobConfiguration, WorkerConfig, WorkerConfigBuilder};
pub use error::{WorkerError, WorkerResult};
pub use job::{ContainerInstanceJob, JobId, JobReport, JobState};
pub use naming::container_group_name;
pub use orchestrator::{InMemoryOrchestrator, JobSubmission, Orchestrator};
pub use registry::JobRegistry;
pub use worker::{FLOW_RUN_ID_ENV, PollSummary, Worker};

pub use prefect_azure_credentials::ImageRegistryCredential;
