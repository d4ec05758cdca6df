//! Job definition and state management.

use chrono::{DateTime, Utc};
use prefect_azure_credentials::{ContainerGroupRef, ContainerGroupStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};

/// Job unique identifier.
pub type JobId = Uuid;

/// Job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Container group created, container not started yet
    Pending,
    /// Container is running
    Running,
    /// Container exited with code 0
    Succeeded,
    /// Provisioning failed, nonzero exit, or start timeout
    Failed,
    /// Cancelled by request
    Cancelled,
}

impl JobState {
    /// Get the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Terminal states never change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(&self, to: JobState) -> bool {
        match self {
            JobState::Pending => to != JobState::Pending,
            JobState::Running => to.is_terminal(),
            _ => false,
        }
    }

    /// Map an observed container group onto a job state.
    pub fn observed(status: &ContainerGroupStatus) -> JobState {
        if status.provisioning_state.eq_ignore_ascii_case("Failed") {
            return JobState::Failed;
        }
        match status.container_state.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("Terminated") => match status.exit_code {
                Some(0) => JobState::Succeeded,
                _ => JobState::Failed,
            },
            Some(s) if s.eq_ignore_ascii_case("Running") => JobState::Running,
            _ => JobState::Pending,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flow run executing as a container group.
#[derive(Debug, Clone)]
pub struct ContainerInstanceJob {
    /// Unique job identifier
    pub id: JobId,

    /// Flow run this job executes
    pub flow_run_id: Uuid,

    /// Flow run name
    pub flow_run_name: String,

    /// Container group running the job
    pub group: ContainerGroupRef,

    /// Container name within the group
    pub container_name: String,

    /// Current state
    pub state: JobState,

    /// Exit code, once terminated
    pub exit_code: Option<i32>,

    /// Failure or cancellation detail
    pub message: Option<String>,

    /// When the job was submitted
    pub created_at: DateTime<Utc>,

    /// When the container started running
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// Emit container logs through tracing
    pub stream_output: bool,

    /// Leave the container group behind when done
    pub keep_container_group: bool,

    /// Maximum time to stay Pending
    pub task_start_timeout: Duration,

    pub(crate) pending_since: Instant,
    pub(crate) log_offset: usize,
    pub(crate) reported: Option<JobState>,
    pub(crate) cleanup_started: bool,
}

impl ContainerInstanceJob {
    /// Create a pending job.
    pub fn new(
        flow_run_id: Uuid,
        flow_run_name: impl Into<String>,
        group: ContainerGroupRef,
        task_start_timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow_run_id,
            flow_run_name: flow_run_name.into(),
            container_name: group.name.clone(),
            group,
            state: JobState::Pending,
            exit_code: None,
            message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            stream_output: false,
            keep_container_group: false,
            task_start_timeout,
            pending_since: Instant::now(),
            log_offset: 0,
            reported: None,
            cleanup_started: false,
        }
    }

    /// Emit container logs.
    pub fn with_stream_output(mut self, stream_output: bool) -> Self {
        self.stream_output = stream_output;
        self
    }

    /// Keep the container group after completion.
    pub fn with_keep_container_group(mut self, keep: bool) -> Self {
        self.keep_container_group = keep;
        self
    }

    /// Check if the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `to`.
    pub fn transition(&mut self, to: JobState, message: Option<String>) -> WorkerResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(WorkerError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        self.state = to;
        if message.is_some() {
            self.message = message;
        }
        match to {
            JobState::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Apply an observed container group status.
    ///
    /// Returns the new state if it changed. A Running job observed as
    /// waiting again stays Running.
    pub fn observe(&mut self, status: &ContainerGroupStatus) -> WorkerResult<Option<JobState>> {
        if self.is_terminal() {
            return Ok(None);
        }

        let observed = JobState::observed(status);
        let unchanged = observed == self.state
            || (self.state == JobState::Running && observed == JobState::Pending);
        if unchanged {
            return Ok(None);
        }

        if observed.is_terminal() {
            self.exit_code = status.exit_code;
        }
        let message = (observed == JobState::Failed).then(|| failure_message(status));
        self.transition(observed, message)?;
        Ok(Some(observed))
    }

    /// Whether a Pending job waited longer than its start timeout.
    pub fn start_timed_out(&self) -> bool {
        self.state == JobState::Pending && self.pending_since.elapsed() > self.task_start_timeout
    }

    /// Whether the current state still needs to be reported.
    pub fn needs_report(&self) -> bool {
        self.reported != Some(self.state)
    }

    /// Identifier reported as the job's infrastructure handle.
    pub fn infrastructure_pid(&self) -> String {
        format!("{}:{}", self.group.resource_group, self.group.name)
    }
}

fn failure_message(status: &ContainerGroupStatus) -> String {
    match (&status.detail, status.exit_code) {
        (Some(detail), _) => detail.clone(),
        (None, Some(code)) => format!("container exited with code {}", code),
        (None, None) => "container group failed".to_string(),
    }
}

/// A state change reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    /// Job identifier
    pub job_id: JobId,

    /// Flow run identifier
    pub flow_run_id: Uuid,

    /// New state
    pub state: JobState,

    /// Container group handle (`<resource group>:<name>`)
    pub infrastructure_pid: String,

    /// Exit code, once terminated
    pub exit_code: Option<i32>,

    /// Failure or cancellation detail
    pub message: Option<String>,

    /// When the report was produced
    pub timestamp: DateTime<Utc>,
}

impl From<&ContainerInstanceJob> for JobReport {
    fn from(job: &ContainerInstanceJob) -> Self {
        Self {
            job_id: job.id,
            flow_run_id: job.flow_run_id,
            state: job.state,
            infrastructure_pid: job.infrastructure_pid(),
            exit_code: job.exit_code,
            message: job.message.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ContainerInstanceJob {
        ContainerInstanceJob::new(
            Uuid::new_v4(),
            "my-flow-run",
            ContainerGroupRef::new("sub", "rg", "my-flow-run-abc123"),
            Duration::from_secs(240),
        )
    }

    fn status(provisioning: &str, container: Option<&str>, exit: Option<i32>) -> ContainerGroupStatus {
        ContainerGroupStatus {
            provisioning_state: provisioning.to_string(),
            container_state: container.map(str::to_string),
            exit_code: exit,
            detail: None,
        }
    }

    #[test]
    fn test_legal_transitions() {
        use JobState::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Succeeded));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Cancelled.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_state_is_immutable() {
        let mut job = job();
        job.transition(JobState::Succeeded, None).unwrap();

        let err = job.transition(JobState::Failed, None).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::InvalidTransition {
                from: JobState::Succeeded,
                to: JobState::Failed
            }
        ));
        assert_eq!(job.state, JobState::Succeeded);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_observed_state_mapping() {
        assert_eq!(JobState::observed(&status("Creating", None, None)), JobState::Pending);
        assert_eq!(
            JobState::observed(&status("Succeeded", Some("Waiting"), None)),
            JobState::Pending
        );
        assert_eq!(
            JobState::observed(&status("Succeeded", Some("Running"), None)),
            JobState::Running
        );
        assert_eq!(
            JobState::observed(&status("Succeeded", Some("Terminated"), Some(0))),
            JobState::Succeeded
        );
        assert_eq!(
            JobState::observed(&status("Succeeded", Some("Terminated"), Some(2))),
            JobState::Failed
        );
        assert_eq!(JobState::observed(&status("Failed", None, None)), JobState::Failed);
    }

    #[test]
    fn test_observe_records_exit_and_message() {
        let mut job = job();

        assert_eq!(
            job.observe(&status("Succeeded", Some("Running"), None)).unwrap(),
            Some(JobState::Running)
        );
        assert!(job.started_at.is_some());
        assert_eq!(job.observe(&status("Succeeded", Some("Waiting"), None)).unwrap(), None);

        assert_eq!(
            job.observe(&status("Succeeded", Some("Terminated"), Some(137))).unwrap(),
            Some(JobState::Failed)
        );
        assert_eq!(job.exit_code, Some(137));
        assert_eq!(job.message.as_deref(), Some("container exited with code 137"));
        assert_eq!(job.observe(&status("Succeeded", Some("Running"), None)).unwrap(), None);
    }

    #[test]
    fn test_report_tracking() {
        let mut job = job();
        assert!(job.needs_report());

        job.reported = Some(JobState::Pending);
        assert!(!job.needs_report());

        job.transition(JobState::Running, None).unwrap();
        assert!(job.needs_report());

        let report = JobReport::from(&job);
        assert_eq!(report.state, JobState::Running);
        assert_eq!(report.infrastructure_pid, "rg:my-flow-run-abc123");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_timeout() {
        let job = job();
        assert!(!job.start_timed_out());

        tokio::time::advance(Duration::from_secs(241)).await;
        assert!(job.start_timed_out());
    }
}
