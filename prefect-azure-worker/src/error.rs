//! Error types for worker operations.

use prefect_azure_credentials::AzureError;
use thiserror::Error;

use crate::job::{JobId, JobState};

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker-specific errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Azure error, unchanged
    #[error(transparent)]
    Azure(#[from] AzureError),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Illegal job state change
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: JobState,
        /// Requested state
        to: JobState,
    },

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,

    /// Worker not running
    #[error("Worker not running")]
    WorkerNotRunning,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Orchestrator error
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),
}

impl WorkerError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an orchestrator error.
    pub fn orchestrator(message: impl Into<String>) -> Self {
        Self::Orchestrator(message.into())
    }

    /// The wrapped Azure error, if any.
    pub fn as_azure(&self) -> Option<&AzureError> {
        match self {
            Self::Azure(e) => Some(e),
            _ => None,
        }
    }
}
