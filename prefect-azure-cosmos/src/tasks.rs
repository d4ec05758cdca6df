//! Standalone Cosmos DB tasks.

use prefect_azure_credentials::{AzureCredentials, CosmosQuery, Result};
use serde_json::Value;
use std::sync::Arc;

use crate::CosmosDbContainer;

/// Return every result matching a query.
pub async fn cosmos_db_query_items(
    query: &CosmosQuery,
    container: &str,
    database: &str,
    credentials: &Arc<AzureCredentials>,
) -> Result<Vec<Value>> {
    CosmosDbContainer::new(credentials.clone(), database, container)?
        .query_items(query)
        .await
}

/// Read the item identified by `item_id`.
pub async fn cosmos_db_read_item(
    item_id: &str,
    partition_key: &Value,
    container: &str,
    database: &str,
    credentials: &Arc<AzureCredentials>,
) -> Result<Value> {
    CosmosDbContainer::new(credentials.clone(), database, container)?
        .read_item(item_id, partition_key)
        .await
}

/// Create an item in a container.
pub async fn cosmos_db_create_item(
    body: Value,
    container: &str,
    database: &str,
    credentials: &Arc<AzureCredentials>,
) -> Result<Value> {
    CosmosDbContainer::new(credentials.clone(), database, container)?
        .create_item(body, None)
        .await
}
