// In-memory Cosmos DB

use async_trait::async_trait;
use parking_lot::RwLock;
use prefect_azure_credentials::{
    AzureError, CosmosApi, CosmosQuery, Result, partition_key_value,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::CallLog;

#[derive(Default)]
struct Collection {
    partition_key_path: String,
    items: Vec<Value>,
}

impl Collection {
    fn partition_value(&self, item: &Value) -> Value {
        partition_key_value(item, &self.partition_key_path)
    }
}

/// In-memory Cosmos DB account.
///
/// Queries are not interpreted: a query returns its canned response, or
/// every item in scope of the partition key.
#[derive(Clone, Default)]
pub struct MemoryCosmos {
    collections: Arc<RwLock<HashMap<(String, String), Collection>>>,
    canned: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    queries: Arc<RwLock<Vec<CosmosQuery>>>,
    log: CallLog,
}

impl MemoryCosmos {
    /// Create an empty account.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container partitioned on `partition_key_path` (e.g. `/tenant`).
    pub fn create_container(&self, database: &str, container: &str, partition_key_path: &str) {
        self.collections.write().insert(
            (database.to_string(), container.to_string()),
            Collection {
                partition_key_path: partition_key_path.to_string(),
                items: Vec::new(),
            },
        );
    }

    /// Store an item directly.
    pub fn insert(&self, database: &str, container: &str, item: Value) {
        self.collections
            .write()
            .entry((database.to_string(), container.to_string()))
            .or_insert_with(|| Collection {
                partition_key_path: "/id".to_string(),
                items: Vec::new(),
            })
            .items
            .push(item);
    }

    /// Return `results` whenever `query` is run.
    pub fn respond_to_query(&self, query: &str, results: Vec<Value>) {
        self.canned.write().insert(query.to_string(), results);
    }

    /// Queries received, in order.
    pub fn queries(&self) -> Vec<CosmosQuery> {
        self.queries.read().clone()
    }

    /// Items stored in a container.
    pub fn items(&self, database: &str, container: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(&(database.to_string(), container.to_string()))
            .map(|c| c.items.clone())
            .unwrap_or_default()
    }

    /// Call log and failure injection.
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    fn missing(database: &str, container: &str) -> AzureError {
        AzureError::ResourceNotFound(format!(
            "NotFound: container '{}/{}' does not exist",
            database, container
        ))
    }
}

#[async_trait]
impl CosmosApi for MemoryCosmos {
    async fn query_items(
        &self,
        database: &str,
        container: &str,
        query: &CosmosQuery,
    ) -> Result<Vec<Value>> {
        self.log.enter("query_items")?;
        self.queries.write().push(query.clone());

        let collections = self.collections.read();
        let collection = collections
            .get(&(database.to_string(), container.to_string()))
            .ok_or_else(|| Self::missing(database, container))?;

        if let Some(results) = self.canned.read().get(&query.query) {
            return Ok(results.clone());
        }

        Ok(collection
            .items
            .iter()
            .filter(|item| {
                query
                    .partition_key
                    .as_ref()
                    .is_none_or(|key| collection.partition_value(item) == *key)
            })
            .cloned()
            .collect())
    }

    async fn read_item(
        &self,
        database: &str,
        container: &str,
        item_id: &str,
        partition_key: &Value,
    ) -> Result<Value> {
        self.log.enter("read_item")?;
        let collections = self.collections.read();
        let collection = collections
            .get(&(database.to_string(), container.to_string()))
            .ok_or_else(|| Self::missing(database, container))?;

        collection
            .items
            .iter()
            .find(|item| {
                item["id"] == item_id && collection.partition_value(item) == *partition_key
            })
            .cloned()
            .ok_or_else(|| {
                AzureError::ResourceNotFound(format!("NotFound: item '{}'", item_id))
            })
    }

    async fn create_item(
        &self,
        database: &str,
        container: &str,
        body: Value,
        partition_key: Option<&Value>,
    ) -> Result<Value> {
        self.log.enter("create_item")?;
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(&(database.to_string(), container.to_string()))
            .ok_or_else(|| Self::missing(database, container))?;

        let key = partition_key
            .cloned()
            .unwrap_or_else(|| collection.partition_value(&body));
        let exists = collection
            .items
            .iter()
            .any(|item| item["id"] == body["id"] && collection.partition_value(item) == key);
        if exists {
            return Err(AzureError::Conflict(format!(
                "Conflict: item '{}' already exists",
                body["id"]
            )));
        }

        collection.items.push(body.clone());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_item_honors_partition_key() {
        let cosmos = MemoryCosmos::new();
        cosmos.create_container("db", "people", "/tenant");
        cosmos
            .create_item("db", "people", json!({"id": "1", "tenant": "a"}), None)
            .await
            .unwrap();

        assert!(cosmos.read_item("db", "people", "1", &json!("a")).await.is_ok());
        assert!(
            cosmos
                .read_item("db", "people", "1", &json!("b"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let cosmos = MemoryCosmos::new();
        cosmos.create_container("db", "c", "/id");
        cosmos.create_item("db", "c", json!({"id": "x"}), None).await.unwrap();
        let err = cosmos
            .create_item("db", "c", json!({"id": "x"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AzureError::Conflict(_)));
    }
}
