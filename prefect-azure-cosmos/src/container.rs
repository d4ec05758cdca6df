//! Cosmos DB container block.

use prefect_azure_credentials::{AzureCredentials, CosmosApi, CosmosQuery, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::validation::{validate_id, validate_item_body, validate_query};

/// Persisted fields of a Cosmos DB container block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosDbConfig {
    /// Database id.
    pub database: String,
    /// Container id.
    pub container: String,
}

/// A Cosmos DB container bound to credentials.
#[derive(Debug, Clone)]
pub struct CosmosDbContainer {
    credentials: Arc<AzureCredentials>,
    config: CosmosDbConfig,
}

impl CosmosDbContainer {
    /// Create a block for a database container.
    pub fn new(
        credentials: Arc<AzureCredentials>,
        database: impl Into<String>,
        container: impl Into<String>,
    ) -> Result<Self> {
        Self::from_config(
            credentials,
            CosmosDbConfig {
                database: database.into(),
                container: container.into(),
            },
        )
    }

    /// Create a block from persisted config.
    pub fn from_config(credentials: Arc<AzureCredentials>, config: CosmosDbConfig) -> Result<Self> {
        validate_id("database", &config.database)?;
        validate_id("container", &config.container)?;
        Ok(Self {
            credentials,
            config,
        })
    }

    /// Get the config.
    pub fn config(&self) -> &CosmosDbConfig {
        &self.config
    }

    fn client(&self) -> Result<Arc<dyn CosmosApi>> {
        self.credentials.cosmos_client()
    }

    /// Run a query and return every result.
    pub async fn query_items(&self, query: &CosmosQuery) -> Result<Vec<Value>> {
        validate_query(query)?;

        info!(
            database = %self.config.database,
            container = %self.config.container,
            parameters = query.parameters.len(),
            cross_partition = query.enable_cross_partition_query,
            "Running query"
        );
        self.client()?
            .query_items(&self.config.database, &self.config.container, query)
            .await
    }

    /// Read one item.
    pub async fn read_item(&self, item_id: &str, partition_key: &Value) -> Result<Value> {
        validate_id("item", item_id)?;

        info!(
            database = %self.config.database,
            container = %self.config.container,
            item = %item_id,
            partition_key = %partition_key,
            "Reading item"
        );
        self.client()?
            .read_item(
                &self.config.database,
                &self.config.container,
                item_id,
                partition_key,
            )
            .await
    }

    /// Create an item and return the stored document.
    pub async fn create_item(&self, body: Value, partition_key: Option<&Value>) -> Result<Value> {
        let id = validate_item_body(&body)?.to_string();

        info!(
            database = %self.config.database,
            container = %self.config.container,
            item = %id,
            "Creating item"
        );
        self.client()?
            .create_item(
                &self.config.database,
                &self.config.container,
                body,
                partition_key,
            )
            .await
    }
}
