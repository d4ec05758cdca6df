//! Blob Storage naming rules and size limits.

use prefect_azure_credentials::{AzureError, Result};

/// Default maximum upload size (100 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum blob name length, in characters.
pub const MAX_BLOB_NAME_LEN: usize = 1024;

/// Check a container name against the service's naming rules.
///
/// 3-63 characters of lowercase letters, digits and hyphens, starting and
/// ending with a letter or digit, without consecutive hyphens.
pub fn validate_container_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(AzureError::invalid_input(format!(
            "invalid container name '{}': {}",
            name, reason
        )))
    };

    if !(3..=63).contains(&name.len()) {
        return invalid("must be 3-63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("only lowercase letters, digits and hyphens are allowed");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("--") {
        return invalid("consecutive hyphens are not allowed");
    }
    Ok(())
}

/// Check a blob name.
pub fn validate_blob_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 {
        return Err(AzureError::invalid_input("blob name must not be empty"));
    }
    if len > MAX_BLOB_NAME_LEN {
        return Err(AzureError::invalid_input(format!(
            "blob name is {} characters, maximum is {}",
            len, MAX_BLOB_NAME_LEN
        )));
    }
    Ok(())
}

/// Check a base folder. It prefixes every blob name, so it shares their limit.
pub fn validate_base_folder(folder: &str) -> Result<()> {
    let len = folder.chars().count();
    if len > MAX_BLOB_NAME_LEN {
        return Err(AzureError::invalid_input(format!(
            "base_folder is {} characters, maximum is {}",
            len, MAX_BLOB_NAME_LEN
        )));
    }
    Ok(())
}

/// Check a payload against the upload limit.
pub fn check_upload_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(AzureError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

/// Join blob path segments with `/`, dropping empty segments.
pub fn join_blob_path(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_container_names() {
        for name in ["abc", "my-container-1", "a1b", "a".repeat(63).as_str()] {
            assert!(validate_container_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_invalid_container_names() {
        for name in [
            "ab",
            "a".repeat(64).as_str(),
            "MyContainer",
            "-abc",
            "abc-",
            "ab--c",
            "ab_c",
            "",
        ] {
            let err = validate_container_name(name).unwrap_err();
            assert!(matches!(err, AzureError::InvalidInput(_)), "{name}");
        }
    }

    #[test]
    fn test_blob_name_length() {
        assert!(validate_blob_name("a").is_ok());
        assert!(validate_blob_name(&"x".repeat(1024)).is_ok());
        assert!(validate_blob_name("").is_err());
        assert!(validate_blob_name(&"x".repeat(1025)).is_err());
    }

    #[test]
    fn test_upload_size() {
        assert!(check_upload_size(10, 10).is_ok());
        assert!(matches!(
            check_upload_size(11, 10),
            Err(AzureError::PayloadTooLarge { size: 11, limit: 10 })
        ));
    }

    #[test]
    fn test_join_blob_path() {
        assert_eq!(join_blob_path(&["base/", "/dir", "file.txt"]), "base/dir/file.txt");
        assert_eq!(join_blob_path(&["", "file.txt"]), "file.txt");
    }
}
