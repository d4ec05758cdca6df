//! Job and worker configuration.

use prefect_azure_credentials::ImageRegistryCredential;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Default container start timeout.
pub const DEFAULT_TASK_START_TIMEOUT: Duration = Duration::from_secs(240);

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of finished jobs kept for inspection.
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 100;

fn default_cpu() -> f64 {
    1.0
}

fn default_memory_gb() -> f64 {
    1.0
}

fn default_task_start_timeout() -> Duration {
    DEFAULT_TASK_START_TIMEOUT
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// How to run one flow run as a container group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfiguration {
    /// Container image
    pub image: String,

    /// Subscription holding the resource group
    pub subscription_id: String,

    /// Resource group the container group is created in
    pub resource_group_name: String,

    /// Azure region; the resource group's location when absent
    #[serde(default)]
    pub location: Option<String>,

    /// CPU cores
    #[serde(default = "default_cpu")]
    pub cpu: f64,

    /// Memory in GB
    #[serde(default = "default_memory_gb")]
    pub memory_gb: f64,

    /// Number of GPUs
    #[serde(default)]
    pub gpu_count: Option<u32>,

    /// GPU SKU (`K80`, `P100`, `V100`)
    #[serde(default)]
    pub gpu_sku: Option<String>,

    /// Environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Environment variables sent as secure values
    #[serde(default)]
    pub secure_env: BTreeMap<String, String>,

    /// Arguments appended to the entrypoint
    #[serde(default)]
    pub command: Vec<String>,

    /// Entrypoint override
    #[serde(default)]
    pub entrypoint: Option<String>,

    /// Private registry credentials
    #[serde(default)]
    pub image_registry: Option<ImageRegistryCredential>,

    /// User-assigned identity resource ids
    #[serde(default)]
    pub identities: Vec<String>,

    /// Subnet resource ids
    #[serde(default)]
    pub subnet_ids: Vec<String>,

    /// DNS servers
    #[serde(default)]
    pub dns_servers: Vec<String>,

    /// Emit container logs through tracing
    #[serde(default)]
    pub stream_output: bool,

    /// Leave the container group behind when done
    #[serde(default)]
    pub keep_container_group: bool,

    /// Maximum time to wait for the container to start, in seconds
    #[serde(default = "default_task_start_timeout", with = "duration_secs")]
    pub task_start_timeout: Duration,
}

impl JobConfiguration {
    /// Create a configuration with defaults.
    pub fn new(
        image: impl Into<String>,
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
    ) -> Self {
        Self {
            image: image.into(),
            subscription_id: subscription_id.into(),
            resource_group_name: resource_group_name.into(),
            location: None,
            cpu: default_cpu(),
            memory_gb: default_memory_gb(),
            gpu_count: None,
            gpu_sku: None,
            env: BTreeMap::new(),
            secure_env: BTreeMap::new(),
            command: Vec::new(),
            entrypoint: None,
            image_registry: None,
            identities: Vec::new(),
            subnet_ids: Vec::new(),
            dns_servers: Vec::new(),
            stream_output: false,
            keep_container_group: false,
            task_start_timeout: DEFAULT_TASK_START_TIMEOUT,
        }
    }

    /// Set the region.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set CPU and memory.
    pub fn resources(mut self, cpu: f64, memory_gb: f64) -> Self {
        self.cpu = cpu;
        self.memory_gb = memory_gb;
        self
    }

    /// Request GPUs.
    pub fn gpu(mut self, count: u32, sku: impl Into<String>) -> Self {
        self.gpu_count = Some(count);
        self.gpu_sku = Some(sku.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Add a secure environment variable.
    pub fn secure_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secure_env.insert(name.into(), value.into());
        self
    }

    /// Set the command.
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set the entrypoint.
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Set private registry credentials.
    pub fn image_registry(mut self, registry: ImageRegistryCredential) -> Self {
        self.image_registry = Some(registry);
        self
    }

    /// Add a user-assigned identity.
    pub fn identity(mut self, resource_id: impl Into<String>) -> Self {
        self.identities.push(resource_id.into());
        self
    }

    /// Add a subnet.
    pub fn subnet(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet_ids.push(subnet_id.into());
        self
    }

    /// Add a DNS server.
    pub fn dns_server(mut self, server: impl Into<String>) -> Self {
        self.dns_servers.push(server.into());
        self
    }

    /// Emit container logs.
    pub fn stream_output(mut self, enabled: bool) -> Self {
        self.stream_output = enabled;
        self
    }

    /// Keep the container group after completion.
    pub fn keep_container_group(mut self, keep: bool) -> Self {
        self.keep_container_group = keep;
        self
    }

    /// Set the start timeout.
    pub fn task_start_timeout(mut self, timeout: Duration) -> Self {
        self.task_start_timeout = timeout;
        self
    }

    /// Entrypoint followed by the command.
    pub fn full_command(&self) -> Vec<String> {
        self.entrypoint
            .iter()
            .cloned()
            .chain(self.command.iter().cloned())
            .collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.image.trim().is_empty() {
            return Err(WorkerError::config("image must not be empty"));
        }
        if self.subscription_id.trim().is_empty() {
            return Err(WorkerError::config("subscription_id must not be empty"));
        }
        if self.resource_group_name.trim().is_empty() {
            return Err(WorkerError::config("resource_group_name must not be empty"));
        }
        if self.cpu.is_nan() || self.cpu <= 0.0 {
            return Err(WorkerError::config(format!("cpu must be positive, got {}", self.cpu)));
        }
        if self.memory_gb.is_nan() || self.memory_gb <= 0.0 {
            return Err(WorkerError::config(format!(
                "memory_gb must be positive, got {}",
                self.memory_gb
            )));
        }
        match (self.gpu_count, self.gpu_sku.as_deref()) {
            (Some(count), None) if count > 0 => {
                return Err(WorkerError::config("gpu_count requires gpu_sku"));
            }
            (None, Some(_)) => return Err(WorkerError::config("gpu_sku requires gpu_count")),
            _ => {}
        }
        if self.task_start_timeout.is_zero() {
            return Err(WorkerError::config("task_start_timeout must be positive"));
        }
        Ok(())
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker name, used in tags and logs
    pub name: String,

    /// Poll interval
    pub poll_interval: Duration,

    /// Number of finished jobs kept for inspection
    pub archive_capacity: usize,

    /// Whether to log job execution
    pub log_execution: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "azure-container-instance-worker".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
            log_execution: true,
        }
    }
}

impl WorkerConfig {
    /// Create a builder.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `PREFECT_AZURE_WORKER_NAME`, `PREFECT_AZURE_WORKER_POLL_INTERVAL`
    /// (seconds) and `PREFECT_AZURE_WORKER_ARCHIVE_CAPACITY`.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> WorkerResult<Self> {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(name) = var("PREFECT_AZURE_WORKER_NAME") {
            builder = builder.name(name);
        }
        if let Some(raw) = var("PREFECT_AZURE_WORKER_POLL_INTERVAL") {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                WorkerError::config(format!("invalid PREFECT_AZURE_WORKER_POLL_INTERVAL '{}'", raw))
            })?;
            let interval = Duration::try_from_secs_f64(secs).map_err(|_| {
                WorkerError::config(format!("invalid PREFECT_AZURE_WORKER_POLL_INTERVAL '{}'", raw))
            })?;
            builder = builder.poll_interval(interval);
        }
        if let Some(raw) = var("PREFECT_AZURE_WORKER_ARCHIVE_CAPACITY") {
            let capacity = raw.trim().parse().map_err(|_| {
                WorkerError::config(format!(
                    "invalid PREFECT_AZURE_WORKER_ARCHIVE_CAPACITY '{}'",
                    raw
                ))
            })?;
            builder = builder.archive_capacity(capacity);
        }

        builder.build()
    }
}

/// Builder for [`WorkerConfig`].
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set the worker name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the archive capacity.
    pub fn archive_capacity(mut self, capacity: usize) -> Self {
        self.config.archive_capacity = capacity;
        self
    }

    /// Enable or disable execution logging.
    pub fn log_execution(mut self, enabled: bool) -> Self {
        self.config.log_execution = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> WorkerResult<WorkerConfig> {
        if self.config.name.trim().is_empty() {
            return Err(WorkerError::config("worker name must not be empty"));
        }
        if self.config.poll_interval.is_zero() {
            return Err(WorkerError::config("poll interval must be positive"));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_job_configuration_defaults_from_json() {
        let config: JobConfiguration = serde_json::from_str(
            r#"{"image": "prefecthq/prefect:3-latest", "subscription_id": "sub", "resource_group_name": "rg"}"#,
        )
        .unwrap();

        assert_eq!(config.cpu, 1.0);
        assert_eq!(config.memory_gb, 1.0);
        assert_eq!(config.task_start_timeout, Duration::from_secs(240));
        assert!(!config.stream_output);
        assert!(!config.keep_container_group);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = || JobConfiguration::new("image", "sub", "rg");

        assert!(JobConfiguration::new("", "sub", "rg").validate().is_err());
        assert!(JobConfiguration::new("image", " ", "rg").validate().is_err());
        assert!(JobConfiguration::new("image", "sub", "").validate().is_err());
        assert!(base().resources(0.0, 1.0).validate().is_err());
        assert!(base().resources(1.0, -2.0).validate().is_err());
        assert!(base().resources(f64::NAN, 1.0).validate().is_err());
        assert!(base().gpu(1, "V100").validate().is_ok());

        let mut missing_sku = base();
        missing_sku.gpu_count = Some(1);
        assert!(matches!(missing_sku.validate(), Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_full_command() {
        let config = JobConfiguration::new("image", "sub", "rg")
            .entrypoint("/opt/prefect/entrypoint.sh")
            .command(["prefect", "flow-run", "execute"]);

        assert_eq!(
            config.full_command(),
            vec!["/opt/prefect/entrypoint.sh", "prefect", "flow-run", "execute"]
        );
    }

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.archive_capacity, 100);
        assert!(config.log_execution);
    }

    #[test]
    fn test_worker_config_from_vars() {
        let config = WorkerConfig::from_vars(vars(&[
            ("PREFECT_AZURE_WORKER_NAME", "aci-east"),
            ("PREFECT_AZURE_WORKER_POLL_INTERVAL", "0.5"),
            ("PREFECT_AZURE_WORKER_ARCHIVE_CAPACITY", "10"),
        ]))
        .unwrap();

        assert_eq!(config.name, "aci-east");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.archive_capacity, 10);
    }

    #[test]
    fn test_worker_config_rejects_bad_vars() {
        assert!(
            WorkerConfig::from_vars(vars(&[("PREFECT_AZURE_WORKER_POLL_INTERVAL", "soon")]))
                .is_err()
        );
        assert!(
            WorkerConfig::from_vars(vars(&[("PREFECT_AZURE_WORKER_POLL_INTERVAL", "0")])).is_err()
        );
        assert!(
            WorkerConfig::from_vars(vars(&[("PREFECT_AZURE_WORKER_ARCHIVE_CAPACITY", "-1")]))
                .is_err()
        );
    }
}
