//! The orchestration system the worker serves.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::config::JobConfiguration;
use crate::error::{WorkerError, WorkerResult};
use crate::job::JobReport;

/// A flow run handed to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Flow run identifier
    pub flow_run_id: Uuid,

    /// Flow run name
    pub flow_run_name: String,

    /// How to run it
    pub configuration: JobConfiguration,
}

impl JobSubmission {
    /// Create a submission.
    pub fn new(
        flow_run_id: Uuid,
        flow_run_name: impl Into<String>,
        configuration: JobConfiguration,
    ) -> Self {
        Self {
            flow_run_id,
            flow_run_name: flow_run_name.into(),
            configuration,
        }
    }
}

/// Source of submitted work and sink for state reports.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Take the submissions waiting for this worker.
    async fn fetch_submissions(&self) -> WorkerResult<Vec<JobSubmission>>;

    /// Report a job state change.
    async fn report(&self, report: JobReport) -> WorkerResult<()>;
}

/// Orchestrator holding submissions and reports in memory.
#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    submissions: Mutex<VecDeque<JobSubmission>>,
    reports: Mutex<Vec<JobReport>>,
    failing_reports: Mutex<usize>,
    failing_fetches: Mutex<usize>,
}

impl InMemoryOrchestrator {
    /// Create an empty orchestrator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a submission for the next fetch.
    pub fn submit(&self, submission: JobSubmission) {
        self.submissions.lock().push_back(submission);
    }

    /// Number of submissions not fetched yet.
    pub fn pending_submissions(&self) -> usize {
        self.submissions.lock().len()
    }

    /// Accepted reports, in order.
    pub fn reports(&self) -> Vec<JobReport> {
        self.reports.lock().clone()
    }

    /// Accepted reports for one flow run.
    pub fn reports_for(&self, flow_run_id: Uuid) -> Vec<JobReport> {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.flow_run_id == flow_run_id)
            .cloned()
            .collect()
    }

    /// Reject the next `count` reports.
    pub fn fail_next_reports(&self, count: usize) {
        *self.failing_reports.lock() = count;
    }

    /// Reject the next `count` fetches.
    pub fn fail_next_fetches(&self, count: usize) {
        *self.failing_fetches.lock() = count;
    }

    fn take_failure(counter: &Mutex<usize>) -> bool {
        let mut remaining = counter.lock();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl Orchestrator for InMemoryOrchestrator {
    async fn fetch_submissions(&self) -> WorkerResult<Vec<JobSubmission>> {
        if Self::take_failure(&self.failing_fetches) {
            return Err(WorkerError::orchestrator("fetch rejected"));
        }
        Ok(self.submissions.lock().drain(..).collect())
    }

    async fn report(&self, report: JobReport) -> WorkerResult<()> {
        if Self::take_failure(&self.failing_reports) {
            return Err(WorkerError::orchestrator("report rejected"));
        }
        self.reports.lock().push(report);
        Ok(())
    }
}
