// In-memory Azure Container Instances

use async_trait::async_trait;
use parking_lot::RwLock;
use prefect_azure_credentials::{
    AzureError, ContainerGroupRef, ContainerGroupSpec, ContainerGroupStatus, ContainerInstanceApi,
    Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::CallLog;

struct Group {
    spec: ContainerGroupSpec,
    status: ContainerGroupStatus,
    logs: String,
}

/// In-memory container groups.
///
/// New groups report `Creating`; drive them with [`Self::set_running`],
/// [`Self::set_terminated`] and [`Self::set_provisioning_failed`].
#[derive(Clone, Default)]
pub struct MemoryContainerInstances {
    groups: Arc<RwLock<HashMap<String, Group>>>,
    locations: Arc<RwLock<HashMap<String, String>>>,
    deleted: Arc<RwLock<Vec<String>>>,
    create_delay: Arc<RwLock<Option<Duration>>>,
    log: CallLog,
}

impl MemoryContainerInstances {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a resource group's location.
    pub fn set_location(&self, resource_group: &str, location: &str) {
        self.locations
            .write()
            .insert(resource_group.to_string(), location.to_string());
    }

    /// Make each create call take `delay` before it lands.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.write() = Some(delay);
    }

    /// Names of groups that exist.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definition a group was created with.
    pub fn spec(&self, name: &str) -> Option<ContainerGroupSpec> {
        self.groups.read().get(name).map(|g| g.spec.clone())
    }

    /// Names of deleted groups, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.read().clone()
    }

    /// Mark a group's container running.
    pub fn set_running(&self, name: &str) {
        self.update(name, |status| {
            status.provisioning_state = "Succeeded".to_string();
            status.container_state = Some("Running".to_string());
        });
    }

    /// Mark a group's container terminated.
    pub fn set_terminated(&self, name: &str, exit_code: i32) {
        self.update(name, |status| {
            status.provisioning_state = "Succeeded".to_string();
            status.container_state = Some("Terminated".to_string());
            status.exit_code = Some(exit_code);
            status.detail = Some(if exit_code == 0 { "Completed" } else { "Error" }.to_string());
        });
    }

    /// Mark a group's provisioning failed.
    pub fn set_provisioning_failed(&self, name: &str, detail: &str) {
        self.update(name, |status| {
            status.provisioning_state = "Failed".to_string();
            status.detail = Some(detail.to_string());
        });
    }

    /// Append to a group's container logs.
    pub fn append_logs(&self, name: &str, text: &str) {
        if let Some(group) = self.groups.write().get_mut(name) {
            group.logs.push_str(text);
        }
    }

    /// Call log and failure injection.
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut ContainerGroupStatus)) {
        if let Some(group) = self.groups.write().get_mut(name) {
            f(&mut group.status);
        }
    }

    fn not_found(group: &ContainerGroupRef) -> AzureError {
        AzureError::ResourceNotFound(format!(
            "ResourceNotFound: container group '{}'",
            group
        ))
    }
}

#[async_trait]
impl ContainerInstanceApi for MemoryContainerInstances {
    async fn resource_group_location(
        &self,
        _subscription_id: &str,
        resource_group: &str,
    ) -> Result<String> {
        self.log.enter("resource_group_location")?;
        self.locations
            .read()
            .get(resource_group)
            .cloned()
            .ok_or_else(|| {
                AzureError::ResourceNotFound(format!(
                    "ResourceGroupNotFound: '{}'",
                    resource_group
                ))
            })
    }

    async fn create_container_group(
        &self,
        group: &ContainerGroupRef,
        spec: &ContainerGroupSpec,
    ) -> Result<()> {
        let delay = *self.create_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.log.enter("create_container_group")?;
        self.groups.write().insert(
            group.name.clone(),
            Group {
                spec: spec.clone(),
                status: ContainerGroupStatus {
                    provisioning_state: "Creating".to_string(),
                    ..Default::default()
                },
                logs: String::new(),
            },
        );
        Ok(())
    }

    async fn container_group_status(
        &self,
        group: &ContainerGroupRef,
    ) -> Result<ContainerGroupStatus> {
        self.log.enter("container_group_status")?;
        self.groups
            .read()
            .get(&group.name)
            .map(|g| g.status.clone())
            .ok_or_else(|| Self::not_found(group))
    }

    async fn container_logs(&self, group: &ContainerGroupRef, _container: &str) -> Result<String> {
        self.log.enter("container_logs")?;
        self.groups
            .read()
            .get(&group.name)
            .map(|g| g.logs.clone())
            .ok_or_else(|| Self::not_found(group))
    }

    async fn delete_container_group(&self, group: &ContainerGroupRef) -> Result<()> {
        self.log.enter("delete_container_group")?;
        self.groups
            .write()
            .remove(&group.name)
            .ok_or_else(|| Self::not_found(group))?;
        self.deleted.write().push(group.name.clone());
        Ok(())
    }
}
