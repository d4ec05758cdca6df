//! Cosmos DB identifier and query checks.

use prefect_azure_credentials::{AzureError, CosmosQuery, Result};
use serde_json::Value;

/// Maximum length of a database, container or item id.
pub const MAX_ID_LEN: usize = 255;

const FORBIDDEN_ID_CHARS: &[char] = &['/', '\\', '?', '#'];

/// Check a database, container or item id.
pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(AzureError::invalid_input(format!("{} id must not be empty", kind)));
    }
    if id.chars().count() > MAX_ID_LEN {
        return Err(AzureError::invalid_input(format!(
            "{} id exceeds {} characters",
            kind, MAX_ID_LEN
        )));
    }
    if let Some(c) = id.chars().find(|c| FORBIDDEN_ID_CHARS.contains(c)) {
        return Err(AzureError::invalid_input(format!(
            "{} id '{}' contains forbidden character '{}'",
            kind, id, c
        )));
    }
    Ok(())
}

/// Check a query's text and parameter names.
pub fn validate_query(query: &CosmosQuery) -> Result<()> {
    if query.query.trim().is_empty() {
        return Err(AzureError::invalid_input("query must not be empty"));
    }
    for param in &query.parameters {
        if !param.name.starts_with('@') || param.name.len() < 2 {
            return Err(AzureError::invalid_input(format!(
                "query parameter '{}' must start with '@'",
                param.name
            )));
        }
    }
    Ok(())
}

/// Check an item body for creation and return its id.
pub fn validate_item_body(body: &Value) -> Result<&str> {
    let object = body
        .as_object()
        .ok_or_else(|| AzureError::invalid_input("item body must be a JSON object"))?;
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AzureError::invalid_input("item body must have a string 'id'"))?;
    validate_id("item", id)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("database", "SampleDB").is_ok());
        assert!(validate_id("database", "").is_err());
        assert!(validate_id("item", "a/b").is_err());
        assert!(validate_id("item", "a#b").is_err());
        assert!(validate_id("item", &"x".repeat(256)).is_err());
        assert!(validate_id("item", &"x".repeat(255)).is_ok());
    }

    #[test]
    fn test_validate_query() {
        assert!(validate_query(&CosmosQuery::new("SELECT * FROM c").param("@age", 44)).is_ok());
        assert!(validate_query(&CosmosQuery::new("  ")).is_err());
        assert!(validate_query(&CosmosQuery::new("SELECT * FROM c").param("age", 44)).is_err());
        assert!(validate_query(&CosmosQuery::new("SELECT * FROM c").param("@", 44)).is_err());
    }

    #[test]
    fn test_validate_item_body() {
        assert_eq!(validate_item_body(&json!({"id": "1", "a": 2})).unwrap(), "1");
        assert!(validate_item_body(&json!([1, 2])).is_err());
        assert!(validate_item_body(&json!({"id": 1})).is_err());
        assert!(validate_item_body(&json!({"id": ""})).is_err());
        assert!(validate_item_body(&json!({"name": "x"})).is_err());
    }
}
