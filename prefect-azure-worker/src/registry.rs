//! In-process job registry.

use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::error::{WorkerError, WorkerResult};
use crate::job::{ContainerInstanceJob, JobId};

/// Tracked jobs plus a bounded archive of finished ones.
///
/// Locks are only held for in-memory updates, never across cloud calls.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, ContainerInstanceJob>>,
    archive: RwLock<VecDeque<ContainerInstanceJob>>,
    capacity: usize,
}

impl JobRegistry {
    /// Create a registry keeping up to `capacity` archived jobs.
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            archive: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Track a job.
    pub async fn insert(&self, job: ContainerInstanceJob) {
        self.jobs.write().await.insert(job.id, job);
    }

    /// Snapshot of a tracked or archived job.
    pub async fn get(&self, id: JobId) -> Option<ContainerInstanceJob> {
        if let Some(job) = self.jobs.read().await.get(&id) {
            return Some(job.clone());
        }
        self.archive
            .read()
            .await
            .iter()
            .find(|job| job.id == id)
            .cloned()
    }

    /// Apply `f` to a tracked job.
    pub async fn update<R>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut ContainerInstanceJob) -> WorkerResult<R>,
    ) -> WorkerResult<R> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(WorkerError::JobNotFound(id))?;
        f(job)
    }

    /// Snapshots of every tracked job.
    pub async fn tracked(&self) -> Vec<ContainerInstanceJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Snapshots of tracked jobs that have not finished.
    pub async fn active(&self) -> Vec<ContainerInstanceJob> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| !job.is_terminal())
            .cloned()
            .collect()
    }

    /// Move a tracked job to the archive, evicting the oldest entry when full.
    pub async fn archive(&self, id: JobId) -> WorkerResult<()> {
        let job = self
            .jobs
            .write()
            .await
            .remove(&id)
            .ok_or(WorkerError::JobNotFound(id))?;

        if self.capacity == 0 {
            return Ok(());
        }
        let mut archive = self.archive.write().await;
        while archive.len() >= self.capacity {
            archive.pop_front();
        }
        archive.push_back(job);
        Ok(())
    }

    /// Archived jobs, oldest first.
    pub async fn archived(&self) -> Vec<ContainerInstanceJob> {
        self.archive.read().await.iter().cloned().collect()
    }

    /// Number of tracked jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether no jobs are tracked.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;
    use prefect_azure_credentials::ContainerGroupRef;
    use std::time::Duration;
    use uuid::Uuid;

    fn job(name: &str) -> ContainerInstanceJob {
        ContainerInstanceJob::new(
            Uuid::new_v4(),
            name,
            ContainerGroupRef::new("sub", "rg", name),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_update_unknown_job() {
        let registry = JobRegistry::new(10);
        let err = registry.update(Uuid::new_v4(), |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_active_excludes_terminal() {
        let registry = JobRegistry::new(10);
        let running = job("a");
        let done = job("b");
        let done_id = done.id;
        registry.insert(running).await;
        registry.insert(done).await;

        registry
            .update(done_id, |job| job.transition(JobState::Succeeded, None))
            .await
            .unwrap();

        assert_eq!(registry.tracked().await.len(), 2);
        assert_eq!(registry.active().await.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_is_bounded() {
        let registry = JobRegistry::new(2);
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let job = job(name);
            ids.push(job.id);
            registry.insert(job).await;
        }
        for id in &ids {
            registry.archive(*id).await.unwrap();
        }

        assert!(registry.is_empty().await);
        let archived = registry.archived().await;
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[0].flow_run_name, "b");
        assert!(registry.get(ids[0]).await.is_none());
        assert!(registry.get(ids[2]).await.is_some());
    }
}
