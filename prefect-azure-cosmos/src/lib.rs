//! # Prefect Azure Cosmos
//!
//! Cosmos DB container block and standalone tasks for querying, reading and
//! creating items.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prefect_azure_cosmos::{CosmosDbContainer, CosmosQuery};
//! use serde_json::json;
//!
//! let people = CosmosDbContainer::new(credentials, "SampleDB", "Persons")?;
//!
//! let adults = people
//!     .query_items(
//!         &CosmosQuery::new("SELECT * FROM c WHERE c.age >= @age")
//!             .param("@age", 44)
//!             .cross_partition(),
//!     )
//!     .await?;
//!
//! people
//!     .create_item(json!({ "id": "olivia", "firstname": "Olivia", "age": 3 }), None)
//!     .await?;
//! ```

mod container;
mod tasks;
pub mod validation;

pub use container::{CosmosDbConfig, CosmosDbContainer};
pub use tasks::{cosmos_db_create_item, cosmos_db_query_items, cosmos_db_read_item};

pub use prefect_azure_credentials::{CosmosQuery, QueryParameter};
