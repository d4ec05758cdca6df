//! Worker that runs flow runs as Azure Container Instances.

use futures::future::join_all;
use prefect_azure_credentials::{
    AzureCredentials, ContainerGroupRef, ContainerGroupSpec, ContainerInstanceApi, ContainerSpec,
    EnvironmentVariable, GpuResource,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{JobConfiguration, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::job::{ContainerInstanceJob, JobId, JobReport, JobState};
use crate::naming::container_group_name;
use crate::orchestrator::{JobSubmission, Orchestrator};
use crate::registry::JobRegistry;

/// Environment variable carrying the flow run id into the container.
pub const FLOW_RUN_ID_ENV: &str = "PREFECT__FLOW_RUN_ID";

/// Tracing target for streamed container output.
pub const OUTPUT_TARGET: &str = "prefect_azure_worker::output";

/// Counts from one polling iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Submissions that created a container group
    pub submitted: usize,
    /// Submissions that failed
    pub failed_submissions: usize,
    /// Job state changes observed
    pub transitions: usize,
    /// Status, log or cleanup calls that failed
    pub errors: usize,
    /// Reports accepted by the orchestrator
    pub reported: usize,
    /// Jobs moved to the archive
    pub archived: usize,
}

struct WorkerInner {
    credentials: Arc<AzureCredentials>,
    orchestrator: Arc<dyn Orchestrator>,
    config: WorkerConfig,
    registry: JobRegistry,
}

/// Worker for running flow runs as container groups.
pub struct Worker {
    inner: Arc<WorkerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Create a worker.
    pub fn new(
        credentials: Arc<AzureCredentials>,
        orchestrator: Arc<dyn Orchestrator>,
        config: WorkerConfig,
    ) -> Self {
        let registry = JobRegistry::new(config.archive_capacity);
        Self {
            inner: Arc::new(WorkerInner {
                credentials,
                orchestrator,
                config,
                registry,
            }),
            handle: Mutex::new(None),
        }
    }

    /// Get the worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Submit a flow run.
    ///
    /// On a failed create call the job is marked Failed, reported, and the
    /// provider error is returned.
    pub async fn submit(&self, submission: JobSubmission) -> WorkerResult<JobId> {
        self.inner.submit(submission).await
    }

    /// Run one polling iteration.
    pub async fn poll_once(&self) -> PollSummary {
        self.inner.poll_once().await
    }

    /// Cancel a job.
    ///
    /// Returns `false` if the job had already finished.
    pub async fn cancel(&self, id: JobId) -> WorkerResult<bool> {
        self.inner.cancel(id).await
    }

    /// Snapshot of a tracked or archived job.
    pub async fn job(&self, id: JobId) -> Option<ContainerInstanceJob> {
        self.inner.registry.get(id).await
    }

    /// Jobs that have not finished.
    pub async fn active_jobs(&self) -> Vec<ContainerInstanceJob> {
        self.inner.registry.active().await
    }

    /// Finished jobs kept for inspection, oldest first.
    pub async fn archived_jobs(&self) -> Vec<ContainerInstanceJob> {
        self.inner.registry.archived().await
    }

    /// Start the polling loop.
    pub async fn start(&self) -> WorkerResult<()> {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(WorkerError::WorkerAlreadyRunning);
        }

        let inner = self.inner.clone();
        let poll_interval = inner.config.poll_interval;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let summary = inner.poll_once().await;
                debug!(worker = %inner.config.name, ?summary, "Poll complete");
            }
        }));

        if self.inner.config.log_execution {
            info!(
                worker = %self.inner.config.name,
                poll_interval = ?poll_interval,
                "Worker started"
            );
        }
        Ok(())
    }

    /// Stop the polling loop.
    pub async fn stop(&self) -> WorkerResult<()> {
        let mut handle = self.handle.lock().await;
        match handle.take() {
            Some(h) if !h.is_finished() => h.abort(),
            _ => return Err(WorkerError::WorkerNotRunning),
        }

        if self.inner.config.log_execution {
            info!(worker = %self.inner.config.name, "Worker stopped");
        }
        Ok(())
    }

    /// Check if the polling loop is running.
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WorkerInner {
    fn aci(&self) -> prefect_azure_credentials::Result<Arc<dyn ContainerInstanceApi>> {
        self.credentials.container_instance_client()
    }

    async fn submit(&self, submission: JobSubmission) -> WorkerResult<JobId> {
        let JobSubmission {
            flow_run_id,
            flow_run_name,
            configuration,
        } = submission;
        configuration.validate()?;

        let group = ContainerGroupRef::new(
            &configuration.subscription_id,
            &configuration.resource_group_name,
            container_group_name(&flow_run_name),
        );
        let job = ContainerInstanceJob::new(
            flow_run_id,
            &flow_run_name,
            group,
            configuration.task_start_timeout,
        )
        .with_stream_output(configuration.stream_output)
        .with_keep_container_group(configuration.keep_container_group);
        let id = job.id;
        self.registry.insert(job.clone()).await;

        match self.launch(&job, &configuration).await {
            Ok(()) => {
                // A cancel that landed mid-create found no group to delete
                let cancelled = self
                    .registry
                    .get(id)
                    .await
                    .filter(|job| job.state == JobState::Cancelled);
                if let Some(cancelled) = cancelled {
                    self.delete_cancelled(&cancelled).await;
                    return Ok(id);
                }
                if self.config.log_execution {
                    info!(
                        job = %id,
                        flow_run = %flow_run_name,
                        container_group = %job.group,
                        "Created container group"
                    );
                }
                Ok(id)
            }
            Err(e) => {
                warn!(
                    job = %id,
                    flow_run = %flow_run_name,
                    container_group = %job.group,
                    error = %e,
                    "Failed to create container group"
                );
                let failed = self
                    .registry
                    .update(id, |job| {
                        if job.is_terminal() {
                            return Ok(false);
                        }
                        job.cleanup_started = true;
                        job.transition(JobState::Failed, Some(e.to_string()))?;
                        Ok(true)
                    })
                    .await;
                if let Ok(true) = failed {
                    self.report(id).await;
                }
                Err(e.into())
            }
        }
    }

    async fn launch(
        &self,
        job: &ContainerInstanceJob,
        configuration: &JobConfiguration,
    ) -> prefect_azure_credentials::Result<()> {
        let aci = self.aci()?;
        let location = match &configuration.location {
            Some(location) => location.clone(),
            None => {
                aci.resource_group_location(&job.group.subscription_id, &job.group.resource_group)
                    .await?
            }
        };

        let spec = self.group_spec(job, configuration, location);
        aci.create_container_group(&job.group, &spec).await
    }

    fn group_spec(
        &self,
        job: &ContainerInstanceJob,
        configuration: &JobConfiguration,
        location: String,
    ) -> ContainerGroupSpec {
        let mut env: Vec<EnvironmentVariable> = configuration
            .env
            .iter()
            .filter(|(name, _)| !configuration.secure_env.contains_key(*name))
            .map(|(name, value)| (name, value, false))
            .chain(configuration.secure_env.iter().map(|(n, v)| (n, v, true)))
            .filter(|(name, _, _)| name.as_str() != FLOW_RUN_ID_ENV)
            .map(|(name, value, secure)| EnvironmentVariable {
                name: name.clone(),
                value: value.clone(),
                secure,
            })
            .collect();
        env.push(EnvironmentVariable {
            name: FLOW_RUN_ID_ENV.to_string(),
            value: job.flow_run_id.to_string(),
            secure: false,
        });

        let gpu = configuration
            .gpu_count
            .filter(|count| *count > 0)
            .zip(configuration.gpu_sku.clone())
            .map(|(count, sku)| GpuResource { count, sku });

        let tags = BTreeMap::from([
            ("prefect-flow-run-id".to_string(), job.flow_run_id.to_string()),
            ("prefect-flow-run-name".to_string(), job.flow_run_name.clone()),
            ("prefect-worker".to_string(), self.config.name.clone()),
        ]);

        ContainerGroupSpec {
            location,
            container: ContainerSpec {
                name: job.container_name.clone(),
                image: configuration.image.clone(),
                command: configuration.full_command(),
                env,
                cpu: configuration.cpu,
                memory_gb: configuration.memory_gb,
                gpu,
            },
            image_registry: configuration.image_registry.clone(),
            identities: configuration.identities.clone(),
            subnet_ids: configuration.subnet_ids.clone(),
            dns_servers: configuration.dns_servers.clone(),
            tags,
        }
    }

    async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();

        match self.orchestrator.fetch_submissions().await {
            Ok(submissions) => {
                for submission in submissions {
                    let flow_run_id = submission.flow_run_id;
                    match self.submit(submission).await {
                        Ok(_) => summary.submitted += 1,
                        Err(e) => {
                            summary.failed_submissions += 1;
                            warn!(flow_run_id = %flow_run_id, error = %e, "Submission failed");
                        }
                    }
                }
            }
            Err(e) => warn!(worker = %self.config.name, error = %e, "Failed to fetch submissions"),
        }

        let aci = if self.registry.is_empty().await {
            None
        } else {
            match self.aci() {
                Ok(aci) => Some(aci),
                Err(e) => {
                    summary.errors += 1;
                    warn!(error = %e, "Container Instances client unavailable");
                    None
                }
            }
        };

        if let Some(aci) = &aci {
            self.observe_all(aci, &mut summary).await;
        }
        self.fail_timed_out(&mut summary).await;
        if let Some(aci) = &aci {
            self.stream_output(aci, &mut summary).await;
        }
        for job in self.registry.tracked().await {
            if job.needs_report() && self.report(job.id).await {
                summary.reported += 1;
            }
        }
        self.clean_up(aci.as_ref(), &mut summary).await;

        summary
    }

    async fn observe_all(&self, aci: &Arc<dyn ContainerInstanceApi>, summary: &mut PollSummary) {
        let active = self.registry.active().await;
        let checks = active.iter().map(|job| async move {
            (job, aci.container_group_status(&job.group).await)
        });

        for (job, result) in join_all(checks).await {
            let status = match result {
                Ok(status) => status,
                Err(e) => {
                    summary.errors += 1;
                    warn!(
                        job = %job.id,
                        container_group = %job.group,
                        error = %e,
                        "Failed to get container group status"
                    );
                    continue;
                }
            };

            match self.registry.update(job.id, |job| job.observe(&status)).await {
                Ok(Some(state)) => {
                    summary.transitions += 1;
                    self.log_transition(job, state);
                }
                Ok(None) => {}
                Err(e) => debug!(job = %job.id, error = %e, "Skipped status update"),
            }
        }
    }

    async fn fail_timed_out(&self, summary: &mut PollSummary) {
        for job in self.registry.active().await {
            if !job.start_timed_out() {
                continue;
            }
            let message = format!(
                "container did not start within {}s",
                job.task_start_timeout.as_secs()
            );
            let result = self
                .registry
                .update(job.id, |job| {
                    if !job.start_timed_out() {
                        return Ok(false);
                    }
                    job.transition(JobState::Failed, Some(message)).map(|_| true)
                })
                .await;
            if let Ok(true) = result {
                summary.transitions += 1;
                self.log_transition(&job, JobState::Failed);
            }
        }
    }

    async fn stream_output(&self, aci: &Arc<dyn ContainerInstanceApi>, summary: &mut PollSummary) {
        for job in self.registry.tracked().await {
            let streaming = job.stream_output
                && !job.cleanup_started
                && !matches!(job.state, JobState::Pending | JobState::Cancelled);
            if !streaming {
                continue;
            }

            let logs = match aci.container_logs(&job.group, &job.container_name).await {
                Ok(logs) => logs,
                Err(e) => {
                    summary.errors += 1;
                    debug!(job = %job.id, error = %e, "Failed to fetch container logs");
                    continue;
                }
            };

            // Restart from the top if the log was truncated
            let start = if logs.is_char_boundary(job.log_offset) {
                job.log_offset
            } else {
                0
            };
            let fresh = &logs[start..];
            // Hold back a partial last line until the container is done
            let consumed = if job.is_terminal() {
                fresh.len()
            } else {
                fresh.rfind('\n').map_or(0, |i| i + 1)
            };

            for line in fresh[..consumed].lines() {
                info!(target: OUTPUT_TARGET, flow_run = %job.flow_run_name, "{}", line);
            }
            let offset = start + consumed;
            if let Err(e) = self
                .registry
                .update(job.id, |job| {
                    job.log_offset = offset;
                    Ok(())
                })
                .await
            {
                debug!(job = %job.id, error = %e, "Skipped log offset update");
            }
        }
    }

    async fn clean_up(
        &self,
        aci: Option<&Arc<dyn ContainerInstanceApi>>,
        summary: &mut PollSummary,
    ) {
        for job in self.registry.tracked().await {
            if !job.is_terminal() {
                continue;
            }

            let cleaned = job.keep_container_group
                || job.cleanup_started
                || self.delete_group(aci, &job, summary).await;
            if !cleaned {
                continue;
            }
            if !job.cleanup_started {
                self.registry
                    .update(job.id, |job| {
                        job.cleanup_started = true;
                        Ok(())
                    })
                    .await
                    .ok();
            }

            let reported = self
                .registry
                .get(job.id)
                .await
                .is_some_and(|job| !job.needs_report());
            if reported && self.registry.archive(job.id).await.is_ok() {
                summary.archived += 1;
            }
        }
    }

    async fn delete_group(
        &self,
        aci: Option<&Arc<dyn ContainerInstanceApi>>,
        job: &ContainerInstanceJob,
        summary: &mut PollSummary,
    ) -> bool {
        let Some(aci) = aci else {
            return false;
        };
        match aci.delete_container_group(&job.group).await {
            Ok(()) => {
                debug!(job = %job.id, container_group = %job.group, "Deleted container group");
                true
            }
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                summary.errors += 1;
                warn!(
                    job = %job.id,
                    container_group = %job.group,
                    error = %e,
                    "Failed to delete container group"
                );
                false
            }
        }
    }

    async fn cancel(&self, id: JobId) -> WorkerResult<bool> {
        let result = self
            .registry
            .update(id, |job| {
                if job.is_terminal() {
                    return Ok(None);
                }
                job.transition(JobState::Cancelled, Some("cancelled by request".to_string()))?;
                let delete = !job.keep_container_group && !job.cleanup_started;
                job.cleanup_started = true;
                Ok(Some((job.group.clone(), delete)))
            })
            .await;

        let (group, delete) = match result {
            Ok(Some(cancelled)) => cancelled,
            Ok(None) => return Ok(false),
            Err(WorkerError::JobNotFound(id)) => {
                return match self.registry.get(id).await {
                    Some(_) => Ok(false),
                    None => Err(WorkerError::JobNotFound(id)),
                };
            }
            Err(e) => return Err(e),
        };

        if self.config.log_execution {
            info!(job = %id, container_group = %group, "Cancelled job");
        }
        self.report(id).await;

        if delete {
            match self.aci() {
                Ok(aci) => {
                    tokio::spawn(async move {
                        match aci.delete_container_group(&group).await {
                            Ok(()) => debug!(container_group = %group, "Deleted container group"),
                            Err(e) if e.is_not_found() => {}
                            Err(e) => warn!(
                                container_group = %group,
                                error = %e,
                                "Failed to delete cancelled container group"
                            ),
                        }
                    });
                }
                Err(e) => warn!(container_group = %group, error = %e, "Cannot delete container group"),
            }
        }
        Ok(true)
    }

    async fn delete_cancelled(&self, job: &ContainerInstanceJob) {
        if job.keep_container_group {
            return;
        }
        let result = match self.aci() {
            Ok(aci) => aci.delete_container_group(&job.group).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(job = %job.id, container_group = %job.group, "Deleted container group"),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(
                    job = %job.id,
                    container_group = %job.group,
                    error = %e,
                    "Failed to delete cancelled container group"
                );
                // Leave it to the polling loop
                self.registry
                    .update(job.id, |job| {
                        job.cleanup_started = false;
                        Ok(())
                    })
                    .await
                    .ok();
            }
        }
    }

    /// Report a job's current state. Returns whether the report was accepted.
    async fn report(&self, id: JobId) -> bool {
        let Some(job) = self.registry.get(id).await else {
            return false;
        };
        if !job.needs_report() {
            return true;
        }

        match self.orchestrator.report(JobReport::from(&job)).await {
            Ok(()) => {
                let state = job.state;
                if let Err(e) = self
                    .registry
                    .update(id, |job| {
                        job.reported = Some(state);
                        Ok(())
                    })
                    .await
                {
                    debug!(job = %id, error = %e, "Skipped report update");
                }
                true
            }
            Err(e) => {
                warn!(job = %id, state = %job.state, error = %e, "Failed to report job state");
                false
            }
        }
    }

    fn log_transition(&self, job: &ContainerInstanceJob, state: JobState) {
        if self.config.log_execution {
            info!(
                job = %job.id,
                flow_run = %job.flow_run_name,
                container_group = %job.group,
                from = %job.state,
                to = %state,
                "Job state changed"
            );
        }
    }
}
