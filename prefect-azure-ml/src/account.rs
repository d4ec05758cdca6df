// Storage account details for datastore registration

use prefect_azure_credentials::{
    AzureCredentials, AzureError, ExposeSecret, Result, SecretString, account_from_url,
};

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// The storage account a blob credential points at.
#[derive(Debug)]
pub(crate) struct BlobAccount {
    pub name: String,
    pub endpoint: String,
    pub protocol: String,
    pub key: Option<SecretString>,
}

impl BlobAccount {
    /// Resolve the account from a blob credential.
    ///
    /// Connection strings carry the key. Account URLs register an
    /// identity-based datastore with no stored secret.
    pub fn from_credentials(credentials: &AzureCredentials) -> Result<Self> {
        let settings = credentials.settings();

        if let Some(conn) = settings.parsed_connection_string()? {
            let name = conn.account_name().ok_or_else(|| {
                AzureError::config("blob connection string has no AccountName")
            })?;
            return Ok(Self {
                name: name.to_string(),
                endpoint: conn.endpoint_suffix().to_string(),
                protocol: conn.protocol().to_string(),
                key: conn.account_key().map(|k| SecretString::new(k.into())),
            });
        }

        let url = settings.account_url.as_deref().ok_or_else(|| {
            AzureError::config("blob credentials need a connection string or account_url")
        })?;
        let (protocol, rest) = url.split_once("://").unwrap_or(("https", url));
        let host = rest.split('/').next().unwrap_or(rest);
        let endpoint = host
            .split_once(".blob.")
            .map(|(_, suffix)| suffix)
            .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);

        Ok(Self {
            name: account_from_url(url)?,
            endpoint: endpoint.to_string(),
            protocol: protocol.to_string(),
            key: None,
        })
    }

    pub fn has_key(&self) -> bool {
        self.key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefect_azure_credentials::CredentialSettings;

    #[test]
    fn test_connection_string_account() {
        let credentials = AzureCredentials::new(
            CredentialSettings::builder()
                .connection_string(
                    "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=abc==;EndpointSuffix=core.chinacloudapi.cn",
                )
                .build(),
        )
        .unwrap();

        let account = BlobAccount::from_credentials(&credentials).unwrap();
        assert_eq!(account.name, "acct");
        assert_eq!(account.endpoint, "core.chinacloudapi.cn");
        assert_eq!(account.protocol, "https");
        assert!(account.has_key());
    }

    #[test]
    fn test_account_url_has_no_key() {
        let credentials = AzureCredentials::new(
            CredentialSettings::builder()
                .managed_identity()
                .account_url("https://mlstore.blob.core.windows.net/")
                .build(),
        )
        .unwrap();

        let account = BlobAccount::from_credentials(&credentials).unwrap();
        assert_eq!(account.name, "mlstore");
        assert_eq!(account.endpoint, "core.windows.net");
        assert!(!account.has_key());
    }

    #[test]
    fn test_missing_account_is_configuration_error() {
        let credentials =
            AzureCredentials::new(CredentialSettings::builder().managed_identity().build())
                .unwrap();

        let err = BlobAccount::from_credentials(&credentials).unwrap_err();
        assert!(err.is_configuration());
    }
}
