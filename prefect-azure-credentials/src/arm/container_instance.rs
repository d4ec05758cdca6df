//! Azure Container Instances over Resource Manager.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::ArmClient;
use crate::clients::{
    ContainerGroupRef, ContainerGroupSpec, ContainerGroupStatus, ContainerInstanceApi,
};
use crate::Result;

/// Azure API version for Container Instances.
const ACI_API_VERSION: &str = "2023-05-01";

/// Azure API version for resource groups.
const RESOURCES_API_VERSION: &str = "2021-04-01";

#[derive(Debug, Deserialize)]
struct ResourceGroup {
    location: String,
}

#[derive(Debug, Deserialize)]
struct ContainerLogs {
    #[serde(default)]
    content: String,
}

/// Container Instances client.
#[derive(Debug, Clone)]
pub struct ArmContainerInstanceClient {
    arm: ArmClient,
}

impl ArmContainerInstanceClient {
    /// Create a client.
    pub fn new(arm: ArmClient) -> Self {
        Self { arm }
    }
}

/// Request body for a container group.
pub(crate) fn container_group_body(spec: &ContainerGroupSpec) -> Value {
    let container = &spec.container;

    let env: Vec<Value> = container
        .env
        .iter()
        .map(|var| {
            if var.secure {
                json!({ "name": var.name, "secureValue": var.value })
            } else {
                json!({ "name": var.name, "value": var.value })
            }
        })
        .collect();

    let mut requests = json!({
        "cpu": container.cpu,
        "memoryInGB": container.memory_gb,
    });
    if let Some(gpu) = &container.gpu {
        requests["gpu"] = json!({ "count": gpu.count, "sku": gpu.sku });
    }

    let mut container_properties = json!({
        "image": container.image,
        "environmentVariables": env,
        "resources": { "requests": requests },
    });
    if !container.command.is_empty() {
        container_properties["command"] = json!(container.command);
    }

    let mut properties = json!({
        "osType": "Linux",
        "restartPolicy": "Never",
        "containers": [{
            "name": container.name,
            "properties": container_properties,
        }],
    });

    if let Some(registry) = &spec.image_registry {
        properties["imageRegistryCredentials"] = json!([{
            "server": registry.server,
            "username": registry.username,
            "password": registry.password.expose_secret(),
        }]);
    }
    if !spec.subnet_ids.is_empty() {
        properties["subnetIds"] = Value::Array(
            spec.subnet_ids
                .iter()
                .map(|id| json!({ "id": id }))
                .collect(),
        );
    }
    if !spec.dns_servers.is_empty() {
        properties["dnsConfig"] = json!({ "nameServers": spec.dns_servers });
    }

    let mut body = json!({
        "location": spec.location,
        "tags": spec.tags,
        "properties": properties,
    });

    if !spec.identities.is_empty() {
        let identities: serde_json::Map<String, Value> = spec
            .identities
            .iter()
            .map(|id| (id.clone(), json!({})))
            .collect();
        body["identity"] = json!({
            "type": "UserAssigned",
            "userAssignedIdentities": identities,
        });
    }

    body
}

/// Extract the observed state from a container group resource.
pub(crate) fn parse_status(resource: &Value) -> ContainerGroupStatus {
    let properties = &resource["properties"];
    let current = &properties["containers"][0]["properties"]["instanceView"]["currentState"];

    let container_state = current["state"]
        .as_str()
        .map(str::to_string)
        .or_else(|| properties["instanceView"]["state"].as_str().map(str::to_string));

    ContainerGroupStatus {
        provisioning_state: properties["provisioningState"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        container_state,
        exit_code: current["exitCode"].as_i64().map(|c| c as i32),
        detail: current["detailStatus"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

#[async_trait]
impl ContainerInstanceApi for ArmContainerInstanceClient {
    async fn resource_group_location(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<String> {
        let path = format!(
            "/subscriptions/{}/resourcegroups/{}",
            subscription_id, resource_group
        );
        let group: ResourceGroup = self.arm.get_json(&path, RESOURCES_API_VERSION).await?;
        Ok(group.location)
    }

    async fn create_container_group(
        &self,
        group: &ContainerGroupRef,
        spec: &ContainerGroupSpec,
    ) -> Result<()> {
        let _: Value = self
            .arm
            .put_json(
                &group.resource_path(),
                ACI_API_VERSION,
                &container_group_body(spec),
            )
            .await?;

        info!(
            container_group = %group,
            image = %spec.container.image,
            location = %spec.location,
            "Container group creation accepted"
        );
        Ok(())
    }

    async fn container_group_status(
        &self,
        group: &ContainerGroupRef,
    ) -> Result<ContainerGroupStatus> {
        let resource: Value = self
            .arm
            .get_json(&group.resource_path(), ACI_API_VERSION)
            .await?;
        Ok(parse_status(&resource))
    }

    async fn container_logs(&self, group: &ContainerGroupRef, container: &str) -> Result<String> {
        let path = format!("{}/containers/{}/logs", group.resource_path(), container);
        let logs: ContainerLogs = self.arm.get_json(&path, ACI_API_VERSION).await?;
        Ok(logs.content)
    }

    async fn delete_container_group(&self, group: &ContainerGroupRef) -> Result<()> {
        self.arm
            .delete(&group.resource_path(), ACI_API_VERSION)
            .await?;
        info!(container_group = %group, "Container group deleted");
        Ok(())
    }
}
