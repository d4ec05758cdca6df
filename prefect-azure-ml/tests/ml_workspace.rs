//! Azure ML workspace block against the in-memory workspace.

use prefect_azure_credentials::{AzureCredentials, AzureError, CredentialSettings, ResourceType};
use prefect_azure_ml::{
    MlWorkspace, ml_get_datastore, ml_list_datastores, ml_register_datastore_blob_container,
    ml_upload_datastore,
};
use prefect_azure_testing::{memory_credentials, memory_credentials_with};
use std::sync::Arc;

const STORE_URL: &str = "https://mlstore.blob.core.windows.net";

#[tokio::test]
async fn test_get_default_datastore() {
    let (credentials, connector) = memory_credentials();
    connector.ml().add_blob_datastore("workspaceblobstore", "mlstore", "azureml", true);
    connector.ml().add_blob_datastore("other", "mlstore", "other", false);

    let all = ml_list_datastores(&credentials).await.unwrap();
    assert_eq!(all.len(), 2);

    let default = ml_get_datastore(&credentials, None).await.unwrap();
    assert_eq!(default.name, "workspaceblobstore");

    let named = ml_get_datastore(&credentials, Some("other")).await.unwrap();
    assert_eq!(named.container_name.as_deref(), Some("other"));
}

#[tokio::test]
async fn test_missing_datastore_is_not_found() {
    let (credentials, _) = memory_credentials();

    let err = ml_get_datastore(&credentials, Some("ghost")).await.unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_upload_directory_to_datastore() {
    let (credentials, connector) = memory_credentials();
    connector.ml().add_blob_datastore("workspaceblobstore", "mlstore", "azureml", true);
    let store = connector.blob_for(STORE_URL);
    store.create_container("azureml");

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("a.csv"), "a,b\n1,2\n").unwrap();
    std::fs::write(dir.path().join("nested/b.csv"), "c\n3\n").unwrap();

    let uploaded = ml_upload_datastore(dir.path(), &credentials, Some("datasets/v1"), None, false)
        .await
        .unwrap();

    assert_eq!(uploaded, vec!["datasets/v1/a.csv", "datasets/v1/nested/b.csv"]);
    assert_eq!(
        store.get("azureml", "datasets/v1/nested/b.csv").unwrap().as_ref(),
        b"c\n3\n"
    );
    assert!(connector.blob().blob_names("azureml").is_empty());
}

#[tokio::test]
async fn test_upload_single_file_to_named_datastore() {
    let (credentials, connector) = memory_credentials();
    connector.ml().add_blob_datastore("raw", "mlstore", "raw", false);
    connector.blob_for(STORE_URL).create_container("raw");

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("model.bin");
    std::fs::write(&file, [1u8, 2, 3]).unwrap();

    let workspace = MlWorkspace::new(credentials);
    let uploaded = workspace
        .upload_to_datastore(&file, Some("raw"), None, false)
        .await
        .unwrap();

    assert_eq!(uploaded, vec!["model.bin"]);
}

#[tokio::test]
async fn test_upload_conflict_without_overwrite() {
    let (credentials, connector) = memory_credentials();
    connector.ml().add_blob_datastore("raw", "mlstore", "raw", true);
    connector.blob_for(STORE_URL).insert("raw", "model.bin", "old");

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("model.bin");
    std::fs::write(&file, "new").unwrap();

    let err = ml_upload_datastore(&file, &credentials, None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AzureError::Conflict(_)));

    ml_upload_datastore(&file, &credentials, None, None, true)
        .await
        .unwrap();
    assert_eq!(
        connector.blob_for(STORE_URL).get("raw", "model.bin").unwrap().as_ref(),
        b"new"
    );
}

#[tokio::test]
async fn test_oversized_file_is_rejected_before_upload() {
    let (credentials, connector) = memory_credentials();
    connector.ml().add_blob_datastore("raw", "mlstore", "raw", true);

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("big.bin");
    std::fs::write(&file, vec![0u8; 64]).unwrap();

    let err = MlWorkspace::new(credentials)
        .max_upload_size(16)
        .upload_to_datastore(&file, None, None, true)
        .await
        .unwrap_err();

    assert!(matches!(err, AzureError::PayloadTooLarge { size: 64, limit: 16 }));
    assert!(!connector.ml().log().was_called("get_datastore"));
}

#[tokio::test]
async fn test_register_with_account_key() {
    let (credentials, connector) = memory_credentials();
    let blob_credentials = AzureCredentials::new(
        CredentialSettings::builder()
            .connection_string(
                "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=abc==;EndpointSuffix=core.windows.net",
            )
            .build(),
    )
    .unwrap();

    let datastore = ml_register_datastore_blob_container(
        "training",
        &credentials,
        &blob_credentials,
        None,
        false,
        true,
    )
    .await
    .unwrap();

    assert_eq!(datastore.name, "training");
    assert!(datastore.is_default);
    let registrations = connector.ml().registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].account_name, "acct");
    assert_eq!(registrations[0].account_key.as_deref(), Some("abc=="));
}

#[tokio::test]
async fn test_register_identity_based_has_no_secret() {
    let (credentials, connector) = memory_credentials();
    let blob_credentials = AzureCredentials::new(
        CredentialSettings::builder()
            .managed_identity()
            .account_url(STORE_URL)
            .build(),
    )
    .unwrap();

    MlWorkspace::new(credentials)
        .register_blob_container("training", &blob_credentials, Some("train-ds"), false, false)
        .await
        .unwrap();

    let registrations = connector.ml().registrations();
    assert_eq!(registrations[0].datastore_name, "train-ds");
    assert_eq!(registrations[0].account_name, "mlstore");
    assert_eq!(registrations[0].account_key, None);
}

#[tokio::test]
async fn test_register_existing_without_overwrite_is_unchanged() {
    let (credentials, connector) = memory_credentials();
    connector.ml().add_blob_datastore("training", "oldacct", "training", false);
    let (blob_credentials, _) = memory_credentials();
    let workspace = MlWorkspace::new(credentials);

    let existing = workspace
        .register_blob_container("training", &blob_credentials, None, false, false)
        .await
        .unwrap();
    assert_eq!(existing.account_name.as_deref(), Some("oldacct"));
    assert!(connector.ml().registrations().is_empty());

    let replaced = workspace
        .register_blob_container("training", &blob_credentials, None, true, false)
        .await
        .unwrap();
    assert_eq!(replaced.account_name.as_deref(), Some("testaccount"));
    assert_eq!(connector.ml().registrations().len(), 1);
}

#[tokio::test]
async fn test_connection_string_credentials_cannot_reach_workspace() {
    let (credentials, connector) = memory_credentials_with(
        CredentialSettings::builder()
            .connection_string("AccountName=acct;AccountKey=abc==")
            .build(),
    );

    let err = MlWorkspace::new(Arc::clone(&credentials))
        .list_datastores()
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(connector.connect_count(ResourceType::MachineLearning), 0);
}
