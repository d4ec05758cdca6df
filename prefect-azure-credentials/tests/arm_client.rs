//! Resource Manager client behavior against a mock server.

use prefect_azure_credentials::{
    AzureConnector, AzureCredentials, AzureError, ContainerGroupRef, CredentialSettings,
    StaticTokenSource,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GROUP_PATH: &str =
    "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ContainerInstance/containerGroups/flow-1";
const DATASTORES_PATH: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.MachineLearningServices/workspaces/ws/datastores";

fn credentials(server: &MockServer) -> AzureCredentials {
    let settings = CredentialSettings::builder()
        .managed_identity()
        .subscription_id("sub")
        .resource_group("rg")
        .workspace_name("ws")
        .management_endpoint(server.uri())
        .build();

    AzureCredentials::new(settings)
        .unwrap()
        .with_connector(Arc::new(AzureConnector::with_token_source(Arc::new(
            StaticTokenSource::new("test-token"),
        ))))
}

fn group() -> ContainerGroupRef {
    ContainerGroupRef::new("sub", "rg", "flow-1")
}

#[tokio::test]
async fn test_resource_group_location_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/sub/resourcegroups/rg"))
        .and(query_param("api-version", "2021-04-01"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "rg",
            "location": "westeurope"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let aci = credentials(&server).container_instance_client().unwrap();
    let location = aci.resource_group_location("sub", "rg").await.unwrap();

    assert_eq!(location, "westeurope");
}

#[tokio::test]
async fn test_404_maps_to_resource_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": "ResourceNotFound",
                "message": "The Resource 'flow-1' was not found."
            }
        })))
        .mount(&server)
        .await;

    let aci = credentials(&server).container_instance_client().unwrap();
    let err = aci.container_group_status(&group()).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("was not found"));
}

#[tokio::test]
async fn test_403_maps_to_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(GROUP_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "AuthorizationFailed", "message": "no access" }
        })))
        .mount(&server)
        .await;

    let aci = credentials(&server).container_instance_client().unwrap();
    let err = aci.delete_container_group(&group()).await.unwrap_err();

    assert!(err.is_authorization());
}

#[tokio::test]
async fn test_429_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .set_body_string("Too many requests"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let aci = credentials(&server).container_instance_client().unwrap();
    let err = aci.container_group_status(&group()).await.unwrap_err();

    match err {
        AzureError::Throttled { retry_after, .. } => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("expected throttled, got {other:?}"),
    }
    // `expect(1)` is verified when the server drops
}

#[tokio::test]
async fn test_503_maps_to_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let aci = credentials(&server).container_instance_client().unwrap();
    assert!(aci.container_group_status(&group()).await.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_container_group_status_and_logs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_PATH))
        .and(query_param("api-version", "2023-05-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": {
                "provisioningState": "Succeeded",
                "containers": [{
                    "name": "flow-1",
                    "properties": {
                        "instanceView": {
                            "currentState": { "state": "Terminated", "exitCode": 0 }
                        }
                    }
                }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/containers/flow-1/logs", GROUP_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "hello\nworld\n"
        })))
        .mount(&server)
        .await;

    let aci = credentials(&server).container_instance_client().unwrap();
    let status = aci.container_group_status(&group()).await.unwrap();
    let logs = aci.container_logs(&group(), "flow-1").await.unwrap();

    assert_eq!(status.container_state.as_deref(), Some("Terminated"));
    assert_eq!(status.exit_code, Some(0));
    assert_eq!(logs, "hello\nworld\n");
}

#[tokio::test]
async fn test_list_datastores_follows_next_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DATASTORES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "name": "workspaceblobstore",
                "properties": { "datastoreType": "AzureBlob", "isDefault": true }
            }],
            "nextLink": format!("{}/datastores-page-2", server.uri())
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/datastores-page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "name": "workspacefilestore",
                "properties": { "datastoreType": "AzureFile" }
            }]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let ml = credentials(&server).ml_client().unwrap();
    let datastores = ml.list_datastores().await.unwrap();
    let names: Vec<&str> = datastores.iter().map(|d| d.name.as_str()).collect();

    assert_eq!(names, vec!["workspaceblobstore", "workspacefilestore"]);

    let default = ml.get_datastore(None).await.unwrap();
    assert_eq!(default.name, "workspaceblobstore");
}

#[tokio::test]
async fn test_building_clients_makes_no_requests() {
    let server = MockServer::start().await;
    let credentials = credentials(&server);

    credentials.container_instance_client().unwrap();
    credentials.ml_client().unwrap();

    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
    assert_eq!(credentials.cached_client_count(), 2);
}
