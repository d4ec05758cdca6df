//! Serde helpers for secret fields.
//!
//! Blocks are persisted, so secrets serialize in clear text. Use with
//! `#[serde(with = "prefect_azure_credentials::secret::option")]`.

use secrecy::{ExposeSecret, SecretString};

/// Copy a secret into a new owned value.
pub fn duplicate(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().into())
}

/// `Option<SecretString>` fields.
pub mod option {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize the exposed value.
    pub fn serialize<S>(value: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(secret) => serializer.serialize_some(secret.expose_secret()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize into a secret.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.map(|v| SecretString::new(v.into())))
    }
}

/// Required `SecretString` fields.
pub mod required {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize the exposed value.
    pub fn serialize<S>(value: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.expose_secret())
    }

    /// Deserialize into a secret.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretString::new(value.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate() {
        let secret = SecretString::new("value".into());
        assert_eq!(duplicate(&secret).expose_secret(), "value");
    }
}
