//! Cosmos DB client on `azure_data_cosmos`.

use async_trait::async_trait;
use azure_data_cosmos::prelude::*;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::sdk_error;
use crate::clients::{CosmosApi, CosmosQuery, partition_key_value};
use crate::connection_string::account_from_url;
use crate::token::identity_credential;
use crate::{AuthMode, AzureError, CredentialSettings, Result};

/// A JSON document carrying its partition key.
#[derive(Serialize)]
#[serde(transparent)]
struct Document {
    #[serde(skip)]
    partition_key: Value,
    body: Value,
}

impl CosmosEntity for Document {
    type Entity = Value;

    fn partition_key(&self) -> Self::Entity {
        self.partition_key.clone()
    }
}

/// Cosmos DB client for one account.
pub struct SdkCosmosClient {
    account: String,
    client: CosmosClient,
}

impl SdkCosmosClient {
    /// Build a client. No request is made.
    pub fn new(
        settings: &CredentialSettings,
        auth: AuthMode,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let conn_str = settings.parsed_connection_string()?;

        let endpoint = endpoint
            .map(str::to_string)
            .or_else(|| settings.cosmos_endpoint.clone())
            .or_else(|| {
                conn_str
                    .as_ref()
                    .and_then(|c| c.account_endpoint().map(str::to_string))
            })
            .ok_or_else(|| AzureError::config("no Cosmos DB endpoint configured"))?;
        let account = account_from_url(&endpoint)?;

        let token = match (auth, &conn_str) {
            (AuthMode::ConnectionString, Some(cs)) => {
                let key = cs
                    .account_key()
                    .ok_or_else(|| AzureError::config("Cosmos DB connection string has no AccountKey"))?;
                AuthorizationToken::primary_key(key).map_err(sdk_error)?
            }
            _ => AuthorizationToken::from_token_credential(identity_credential(settings, auth)?),
        };

        let client = CosmosClient::new(account.clone(), token);

        debug!(account = %account, "Cosmos DB client built");
        Ok(Self { account, client })
    }

    fn collection(&self, database: &str, container: &str) -> CollectionClient {
        self.client
            .database_client(database.to_string())
            .collection_client(container.to_string())
    }

    /// Read the container's partition key path and pull it out of `body`.
    async fn derive_partition_key(
        &self,
        database: &str,
        container: &str,
        body: &Value,
    ) -> Result<Value> {
        let response = self
            .collection(database, container)
            .get_collection()
            .await
            .map_err(sdk_error)?;
        let path = response
            .collection
            .parition_key
            .paths
            .first()
            .ok_or_else(|| AzureError::Service {
                status: 0,
                message: format!("{}/{} has no partition key path", database, container),
            })?;

        debug!(database = %database, container = %container, path = %path, "Derived partition key path");
        Ok(partition_key_value(body, path))
    }
}

#[async_trait]
impl CosmosApi for SdkCosmosClient {
    async fn query_items(
        &self,
        database: &str,
        container: &str,
        query: &CosmosQuery,
    ) -> Result<Vec<Value>> {
        let params = query
            .parameters
            .iter()
            .map(|p| Param::new(p.name.clone(), p.value.clone()))
            .collect();
        let mut builder = self
            .collection(database, container)
            .query_documents(Query::with_params(query.query.clone(), params))
            .query_cross_partition(query.enable_cross_partition_query);
        if let Some(key) = &query.partition_key {
            builder = builder.partition_key(key).map_err(sdk_error)?;
        }

        let mut items = Vec::new();
        let mut stream = builder.into_stream::<Value>();
        while let Some(page) = stream.next().await {
            let page = page.map_err(sdk_error)?;
            items.extend(page.results.into_iter().map(|(doc, _)| doc));
        }

        debug!(account = %self.account, database = %database, container = %container, count = items.len(), "Cosmos DB query completed");
        Ok(items)
    }

    async fn read_item(
        &self,
        database: &str,
        container: &str,
        item_id: &str,
        partition_key: &Value,
    ) -> Result<Value> {
        let response = self
            .collection(database, container)
            .document_client(item_id.to_string(), partition_key)
            .map_err(sdk_error)?
            .get_document::<Value>()
            .await
            .map_err(sdk_error)?;

        match response {
            GetDocumentResponse::Found(found) => Ok(found.document.document),
            GetDocumentResponse::NotFound(_) => Err(AzureError::ResourceNotFound(format!(
                "item '{}' not found in {}/{}",
                item_id, database, container
            ))),
        }
    }

    async fn create_item(
        &self,
        database: &str,
        container: &str,
        body: Value,
        partition_key: Option<&Value>,
    ) -> Result<Value> {
        let partition_key = match partition_key {
            Some(key) => key.clone(),
            None => self.derive_partition_key(database, container, &body).await?,
        };
        let document = Document {
            partition_key: partition_key.clone(),
            body: body.clone(),
        };

        self.collection(database, container)
            .create_document(document)
            .is_upsert(false)
            .partition_key(&partition_key)
            .map_err(sdk_error)?
            .await
            .map_err(sdk_error)?;

        info!(account = %self.account, database = %database, container = %container, "Created Cosmos DB item");
        Ok(body)
    }
}
