//! Storage and Cosmos DB connection string parsing.

use std::collections::HashMap;

use crate::{AzureError, Result};

/// Account name and key used by the Azurite emulator.
pub const EMULATOR_ACCOUNT: &str = "devstoreaccount1";
/// Well-known Azurite account key.
pub const EMULATOR_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// A parsed `Key=Value;Key=Value` connection string.
///
/// Keys are matched case-insensitively. Values may contain `=` (account
/// keys are base64).
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: HashMap<String, String>,
}

impl ConnectionString {
    /// Parse and validate a connection string.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AzureError::config("connection string is empty"));
        }

        let mut pairs = HashMap::new();
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                AzureError::config(format!(
                    "malformed connection string segment '{}'",
                    segment.split('=').next().unwrap_or_default()
                ))
            })?;
            if key.trim().is_empty() {
                return Err(AzureError::config("connection string has an empty key"));
            }
            pairs.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let parsed = Self { pairs };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.is_development_storage() {
            return Ok(());
        }

        let has_target = self.account_name().is_some()
            || self.account_endpoint().is_some()
            || self.blob_endpoint().is_some();
        if !has_target {
            return Err(AzureError::config(
                "connection string must name an AccountName, AccountEndpoint or BlobEndpoint",
            ));
        }

        let has_secret = self.account_key().is_some() || self.shared_access_signature().is_some();
        if !has_secret {
            return Err(AzureError::config(
                "connection string must carry an AccountKey or SharedAccessSignature",
            ));
        }

        Ok(())
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `UseDevelopmentStorage=true` (Azurite).
    pub fn is_development_storage(&self) -> bool {
        self.get("UseDevelopmentStorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Storage account name.
    pub fn account_name(&self) -> Option<&str> {
        if self.is_development_storage() {
            return Some(EMULATOR_ACCOUNT);
        }
        self.get("AccountName")
    }

    /// Account key (storage or Cosmos DB).
    pub fn account_key(&self) -> Option<&str> {
        if self.is_development_storage() {
            return Some(EMULATOR_ACCOUNT_KEY);
        }
        self.get("AccountKey")
    }

    /// Cosmos DB account endpoint.
    pub fn account_endpoint(&self) -> Option<&str> {
        self.get("AccountEndpoint")
    }

    /// Explicit blob endpoint.
    pub fn blob_endpoint(&self) -> Option<&str> {
        self.get("BlobEndpoint")
    }

    /// Shared access signature.
    pub fn shared_access_signature(&self) -> Option<&str> {
        self.get("SharedAccessSignature")
    }

    /// Endpoint suffix, `core.windows.net` when absent.
    pub fn endpoint_suffix(&self) -> &str {
        self.get("EndpointSuffix").unwrap_or("core.windows.net")
    }

    /// Protocol, `https` when absent.
    pub fn protocol(&self) -> &str {
        self.get("DefaultEndpointsProtocol").unwrap_or("https")
    }

    /// Blob service URL for this account.
    pub fn blob_service_url(&self) -> Option<String> {
        if let Some(endpoint) = self.blob_endpoint() {
            return Some(endpoint.trim_end_matches('/').to_string());
        }
        if self.is_development_storage() {
            return Some(format!("http://127.0.0.1:10000/{}", EMULATOR_ACCOUNT));
        }
        self.account_name().map(|account| {
            format!(
                "{}://{}.blob.{}",
                self.protocol(),
                account,
                self.endpoint_suffix()
            )
        })
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name())
            .field("account_endpoint", &self.account_endpoint())
            .field("account_key", &self.account_key().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Derive the account name from a service URL (`https://<account>.blob...`).
pub fn account_from_url(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| AzureError::config(format!("invalid account URL '{}': {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AzureError::config(format!("account URL '{}' has no host", url)))?;

    // Emulator style: http://127.0.0.1:10000/<account>
    if host.parse::<std::net::IpAddr>().is_ok() || host == "localhost" {
        return parsed
            .path_segments()
            .and_then(|mut segments| segments.next().map(str::to_string))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AzureError::config(format!("account URL '{}' has no account", url)));
    }

    host.split('.')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AzureError::config(format!("account URL '{}' has no account", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_storage_connection_string() {
        let cs = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=abc==;EndpointSuffix=core.windows.net",
        )
        .unwrap();

        assert_eq!(cs.account_name(), Some("acct"));
        assert_eq!(cs.account_key(), Some("abc=="));
        assert_eq!(
            cs.blob_service_url().as_deref(),
            Some("https://acct.blob.core.windows.net")
        );
    }

    #[test]
    fn test_parse_cosmos_connection_string() {
        let cs = ConnectionString::parse(
            "AccountEndpoint=https://db.documents.azure.com:443/;AccountKey=key==;",
        )
        .unwrap();

        assert_eq!(
            cs.account_endpoint(),
            Some("https://db.documents.azure.com:443/")
        );
        assert_eq!(cs.account_key(), Some("key=="));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let cs = ConnectionString::parse("accountname=acct;accountkey=k").unwrap();
        assert_eq!(cs.account_name(), Some("acct"));
    }

    #[test]
    fn test_development_storage() {
        let cs = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(cs.account_name(), Some(EMULATOR_ACCOUNT));
        assert!(cs.blob_service_url().unwrap().starts_with("http://127.0.0.1:10000"));
    }

    #[test]
    fn test_rejects_empty_and_malformed() {
        assert!(ConnectionString::parse("").unwrap_err().is_configuration());
        assert!(ConnectionString::parse("garbage").unwrap_err().is_configuration());
        assert!(
            ConnectionString::parse("AccountName=acct")
                .unwrap_err()
                .is_configuration()
        );
        assert!(
            ConnectionString::parse("AccountKey=abc")
                .unwrap_err()
                .is_configuration()
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let cs = ConnectionString::parse("AccountName=acct;AccountKey=supersecret").unwrap();
        let rendered = format!("{:?}", cs);
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn test_account_from_url() {
        assert_eq!(
            account_from_url("https://acct.blob.core.windows.net").unwrap(),
            "acct"
        );
        assert_eq!(
            account_from_url("http://127.0.0.1:10000/devstoreaccount1").unwrap(),
            "devstoreaccount1"
        );
        assert!(account_from_url("not a url").is_err());
    }
}
