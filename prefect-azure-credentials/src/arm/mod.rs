//! Azure Resource Manager REST client.
//!
//! Used for services without a Rust SDK (Azure ML, Container Instances).
//! Status codes map onto [`AzureError`]; requests are never retried here.

mod container_instance;
mod machine_learning;

pub use container_instance::ArmContainerInstanceClient;
pub use machine_learning::ArmMachineLearningClient;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::parse_retry_after;
use crate::token::{MANAGEMENT_SCOPE, TokenSource};
use crate::{AzureError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A page of an ARM list response.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

/// ARM error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Authenticated Resource Manager client.
#[derive(Clone)]
pub struct ArmClient {
    http: Client,
    base_url: String,
    token_source: Arc<dyn TokenSource>,
}

impl ArmClient {
    /// Create a client for `base_url` (normally `https://management.azure.com`).
    ///
    /// No request is made until the first operation.
    pub fn new(base_url: impl Into<String>, token_source: Arc<dyn TokenSource>) -> Result<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url).map_err(|e| {
            AzureError::config(format!("invalid management endpoint '{}': {}", base_url, e))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AzureError::config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_source,
        })
    }

    /// Base URL requests are made against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, api_version: &str) -> Result<url::Url> {
        let mut url = url::Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| AzureError::invalid_input(format!("invalid resource path '{}': {}", path, e)))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    async fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token_source.token(MANAGEMENT_SCOPE).await?;
        Ok(builder.bearer_auth(token))
    }

    /// Send a request and map error statuses.
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.authorize(builder).await?.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => format!("{}: {}", envelope.error.code, envelope.error.message),
            Err(_) if text.is_empty() => status.to_string(),
            Err(_) => text,
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(status = %status, retry_after = ?retry_after, "Resource Manager throttled request");
        }

        Err(AzureError::from_status(status.as_u16(), message, retry_after))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, "Failed to parse Resource Manager response");
            AzureError::Serialization(e.to_string())
        })
    }

    /// GET a resource.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, api_version: &str) -> Result<T> {
        let url = self.url(path, api_version)?;
        debug!(url = %url, "GET request");
        let response = self.send(self.http.get(url)).await?;
        Self::parse(response).await
    }

    /// GET a collection, following `nextLink` until exhausted.
    pub async fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path, api_version)?);

        while let Some(url) = next.take() {
            debug!(url = %url, "GET page");
            let response = self.send(self.http.get(url)).await?;
            let page: Page<T> = Self::parse(response).await?;
            items.extend(page.value);
            next = page
                .next_link
                .filter(|link| !link.is_empty())
                .map(|link| {
                    url::Url::parse(&link).map_err(|e| {
                        AzureError::Serialization(format!("invalid nextLink '{}': {}", link, e))
                    })
                })
                .transpose()?;
        }

        Ok(items)
    }

    /// PUT a resource and return the response body.
    pub async fn put_json<T, B>(&self, path: &str, api_version: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = self.url(path, api_version)?;
        debug!(url = %url, "PUT request");
        let response = self.send(self.http.put(url).json(body)).await?;
        Self::parse(response).await
    }

    /// DELETE a resource.
    pub async fn delete(&self, path: &str, api_version: &str) -> Result<()> {
        let url = self.url(path, api_version)?;
        debug!(url = %url, "DELETE request");
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
