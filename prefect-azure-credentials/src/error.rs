//! Azure error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for Azure operations.
pub type Result<T> = std::result::Result<T, AzureError>;

/// Azure errors, classified by what the caller can do about them.
#[derive(Debug, Error)]
pub enum AzureError {
    /// Missing, malformed or contradictory configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Request rejected by the provider (401/403).
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Target resource does not exist (404).
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Target resource already exists (409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit signaled by the provider (429).
    #[error("Request throttled: {message}")]
    Throttled {
        /// Provider message.
        message: String,
        /// Delay suggested by the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// Connection failure, timeout or 5xx.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Input rejected before reaching the provider.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Payload exceeds the configured limit.
    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Actual size.
        size: u64,
        /// Maximum allowed size.
        limit: u64,
    },

    /// Any other provider error.
    #[error("Azure service error ({status}): {message}")]
    Service {
        /// HTTP status, or 0 when unknown.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Service not compiled in.
    #[error("Service '{0}' is not enabled. Enable the feature flag in Cargo.toml")]
    ServiceNotEnabled(&'static str),
}

const THROTTLED_CODES: &[&str] = &["TooManyRequests", "ServerBusy"];
const AUTHORIZATION_CODES: &[&str] = &[
    "AuthenticationFailed",
    "AuthorizationFailure",
    "AuthorizationPermissionMismatch",
    "Forbidden",
    "Unauthorized",
];
const NOT_FOUND_CODES: &[&str] = &["NotFound"];
const CONFLICT_CODES: &[&str] = &["AlreadyExists", "Conflict"];
const TRANSIENT_CODES: &[&str] = &[
    "OperationTimedOut",
    "InternalError",
    "ServiceUnavailable",
    "BadGateway",
    "GatewayTimeout",
];
const TRANSIENT_PHRASES: &[&str] = &[
    "timed out",
    "connection reset",
    "connection refused",
    "connection closed",
    "error sending request",
];

/// Service error codes, matched as a suffix of a whole word, and the
/// status they stand for.
const CODE_STATUSES: &[(&[&str], u16)] = &[
    (THROTTLED_CODES, 429),
    (AUTHORIZATION_CODES, 403),
    (NOT_FOUND_CODES, 404),
    (CONFLICT_CODES, 409),
    (TRANSIENT_CODES, 503),
];

/// Best guess at the HTTP status behind a rendered SDK error.
///
/// Error codes win over bare numbers, and numbers only count as whole
/// words so request ids and timestamps never match.
fn status_hint(message: &str) -> Option<u16> {
    let words: Vec<&str> = message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    CODE_STATUSES
        .iter()
        .find(|(codes, _)| {
            words
                .iter()
                .any(|word| codes.iter().any(|code| word.ends_with(code)))
        })
        .map(|(_, status)| *status)
        .or_else(|| {
            words
                .iter()
                .filter(|word| word.len() == 3)
                .filter_map(|word| word.parse::<u16>().ok())
                .find(|status| (400..600).contains(status))
        })
        .or_else(|| {
            TRANSIENT_PHRASES
                .iter()
                .any(|phrase| message.contains(phrase))
                .then_some(503)
        })
}

impl AzureError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a service not enabled error.
    pub fn not_enabled(service: &'static str) -> Self {
        Self::ServiceNotEnabled(service)
    }

    /// Classify an HTTP error response.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authorization(message),
            404 => Self::ResourceNotFound(message),
            409 => Self::Conflict(message),
            429 => Self::Throttled {
                message,
                retry_after,
            },
            408 | 500..=599 => Self::TransientNetwork(message),
            _ => Self::Service { status, message },
        }
    }

    /// Classify an Azure SDK error from its rendered message.
    ///
    /// Used when the SDK hands back no status code. Service error codes
    /// (`BlobNotFound`, `ServerBusy`, ...) take precedence over numbers.
    pub fn from_sdk_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match status_hint(&message) {
            Some(status) => Self::from_status(status, message, None),
            None => Self::Service { status: 0, message },
        }
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is an authorization error.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound(_))
    }

    /// Check if this is a throttling error.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Check if this is a transient network error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Convert to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) | Self::InvalidInput(_) => 400,
            Self::Authorization(_) => 403,
            Self::ResourceNotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::PayloadTooLarge { .. } => 413,
            Self::Throttled { .. } => 429,
            Self::TransientNetwork(_) => 503,
            Self::Service { status, .. } if *status != 0 => *status,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for AzureError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AzureError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string(), None)
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::TransientNetwork(err.to_string())
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(AzureError::from_status(401, "no", None).is_authorization());
        assert!(AzureError::from_status(403, "no", None).is_authorization());
        assert!(AzureError::from_status(404, "gone", None).is_not_found());
        assert!(AzureError::from_status(429, "slow down", None).is_throttled());
        assert!(AzureError::from_status(503, "busy", None).is_transient());
        assert!(AzureError::from_status(408, "timeout", None).is_transient());
        assert!(matches!(
            AzureError::from_status(409, "exists", None),
            AzureError::Conflict(_)
        ));
        assert!(matches!(
            AzureError::from_status(400, "bad", None),
            AzureError::Service { status: 400, .. }
        ));
    }

    #[test]
    fn test_throttled_keeps_retry_after() {
        let err = AzureError::from_status(429, "slow down", Some(Duration::from_secs(7)));
        match err {
            AzureError::Throttled { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_sdk_message() {
        assert!(AzureError::from_sdk_message("BlobNotFound: The specified blob does not exist.").is_not_found());
        assert!(AzureError::from_sdk_message("ServerBusy: ingress over limit").is_throttled());
        assert!(AzureError::from_sdk_message("AuthenticationFailed: bad signature").is_authorization());
        assert!(AzureError::from_sdk_message("request timed out").is_transient());
        assert!(matches!(
            AzureError::from_sdk_message("something odd"),
            AzureError::Service { status: 0, .. }
        ));
    }

    #[test]
    fn test_from_sdk_message_ignores_numbers_inside_request_ids() {
        let err = AzureError::from_sdk_message(
            "HttpResponse(NotFound): BlobNotFound: The specified blob does not exist.\n\
             RequestId:0a6c4290-401e-0042-4290-a1b2c3d4e5f6",
        );
        assert!(err.is_not_found());

        let err = AzureError::from_sdk_message(
            "ContainerAlreadyExists RequestId:8f2a4290-0429-4503-9404-000000000429",
        );
        assert!(matches!(err, AzureError::Conflict(_)));

        let err = AzureError::from_sdk_message("RequestId:12345429-aaaa-bbbb-cccc-dddddddddddd");
        assert!(matches!(err, AzureError::Service { status: 0, .. }));
    }

    #[test]
    fn test_from_sdk_message_uses_whole_status_numbers() {
        assert!(AzureError::from_sdk_message("HttpResponse(404,unknown)").is_not_found());
        assert!(AzureError::from_sdk_message("HttpResponse(429,unknown)").is_throttled());
        assert!(matches!(
            AzureError::from_sdk_message("HttpResponse(412,unknown)"),
            AzureError::Service { status: 412, .. }
        ));
        assert!(AzureError::from_sdk_message("connection reset by peer").is_transient());
        assert!(matches!(
            AzureError::from_sdk_message("missing connection string"),
            AzureError::Service { status: 0, .. }
        ));
    }

    #[test]
    fn test_status_code() {
        assert_eq!(AzureError::config("x").status_code(), 400);
        assert_eq!(AzureError::ResourceNotFound("x".into()).status_code(), 404);
        assert_eq!(
            AzureError::PayloadTooLarge { size: 2, limit: 1 }.status_code(),
            413
        );
        assert_eq!(
            AzureError::Service {
                status: 418,
                message: "teapot".into()
            }
            .status_code(),
            418
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("12"), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_error_display() {
        let err = AzureError::not_enabled("blob");
        assert!(err.to_string().contains("blob"));
    }
}
