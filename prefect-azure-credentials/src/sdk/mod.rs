//! Azure SDK-backed clients.

#[cfg(feature = "blob")]
pub mod blob;

#[cfg(feature = "cosmos")]
pub mod cosmos;

/// Map an SDK error into the crate taxonomy.
///
/// HTTP failures carry their status code and service error code. Anything
/// else falls back to [`crate::AzureError::from_sdk_message`].
#[cfg(any(feature = "blob", feature = "cosmos"))]
pub(crate) fn sdk_error(err: azure_core::Error) -> crate::AzureError {
    use azure_core::error::ErrorKind;

    match err.kind() {
        ErrorKind::HttpResponse { status, error_code } => {
            let message = match error_code {
                Some(code) => format!("{}: {}", code, err),
                None => err.to_string(),
            };
            crate::AzureError::from_status(u16::from(*status), message, None)
        }
        ErrorKind::Io => crate::AzureError::TransientNetwork(err.to_string()),
        ErrorKind::DataConversion => crate::AzureError::Serialization(err.to_string()),
        _ => crate::AzureError::from_sdk_message(err.to_string()),
    }
}

#[cfg(all(test, any(feature = "blob", feature = "cosmos")))]
mod tests {
    use super::*;
    use azure_core::StatusCode;
    use azure_core::error::{Error, ErrorKind};

    #[test]
    fn test_sdk_error_uses_status_code() {
        let err = Error::message(
            ErrorKind::http_response(StatusCode::NotFound, Some("BlobNotFound".to_string())),
            "The specified blob does not exist. RequestId:0a6c4290-401e-0042-4290-a1b2c3d4e5f6",
        );
        let mapped = sdk_error(err);
        assert!(mapped.is_not_found());
        assert!(mapped.to_string().contains("BlobNotFound"));

        let err = Error::message(
            ErrorKind::http_response(StatusCode::Conflict, None),
            "ServerBusy mentioned in a conflict body",
        );
        assert!(matches!(sdk_error(err), crate::AzureError::Conflict(_)));

        let err = Error::message(
            ErrorKind::http_response(StatusCode::TooManyRequests, None),
            "slow down",
        );
        assert!(sdk_error(err).is_throttled());
    }

    #[test]
    fn test_sdk_error_other_kinds() {
        let err = Error::message(ErrorKind::Io, "connection reset");
        assert!(sdk_error(err).is_transient());

        let err = Error::message(ErrorKind::Other, "BlobNotFound: gone");
        assert!(sdk_error(err).is_not_found());
    }
}
