//! Object metadata validation module
//!
//! S3 sends user metadata as `x-amz-meta-*` headers, so keys must be header-safe and
//! the whole map is capped at 2 KiB (keys plus values, as counted by S3).

use std::collections::HashMap;

/// Maximum combined size of user metadata keys and values, in bytes
pub const MAX_METADATA_SIZE: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("Metadata key cannot be empty")]
    EmptyKey,

    #[error("Metadata key '{0}' contains invalid characters. Allowed: letters, digits, underscore (_), hyphen (-), dot (.)")]
    InvalidKey(String),

    #[error("Metadata value for key '{0}' contains control characters")]
    InvalidValue(String),

    #[error("Metadata is {size} bytes, maximum allowed is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Validate a metadata key name
///
/// Rules:
/// - Must not be empty
/// - Only `a-z`, `A-Z`, `0-9`, `_`, `-` and `.`
pub fn validate_metadata_key(key: &str) -> Result<(), MetadataError> {
    if key.is_empty() {
        return Err(MetadataError::EmptyKey);
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(MetadataError::InvalidKey(key.to_string()));
    }

    Ok(())
}

/// Validate a metadata value; header values cannot carry control characters
pub fn validate_metadata_value(key: &str, value: &str) -> Result<(), MetadataError> {
    if value.chars().any(|c| c.is_control()) {
        return Err(MetadataError::InvalidValue(key.to_string()));
    }
    Ok(())
}

/// Combined byte size of all keys and values
pub fn metadata_size(metadata: &HashMap<String, String>) -> usize {
    metadata.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Validate a user metadata map
///
/// Validates every key and value and the combined size limit.
pub fn validate_user_metadata(metadata: &HashMap<String, String>) -> Result<(), MetadataError> {
    for (key, value) in metadata {
        validate_metadata_key(key)?;
        validate_metadata_value(key, value)?;
    }

    let size = metadata_size(metadata);
    if size > MAX_METADATA_SIZE {
        return Err(MetadataError::TooLarge {
            size,
            limit: MAX_METADATA_SIZE,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_metadata_key_valid() {
        assert!(validate_metadata_key("userId").is_ok());
        assert!(validate_metadata_key("user_id").is_ok());
        assert!(validate_metadata_key("user-id").is_ok());
        assert!(validate_metadata_key("user.id").is_ok());
        assert!(validate_metadata_key("ABC123").is_ok());
        assert!(validate_metadata_key("a").is_ok());
    }

    #[test]
    fn test_validate_metadata_key_invalid_characters() {
        assert!(validate_metadata_key("user id").is_err()); // space
        assert!(validate_metadata_key("user@id").is_err());
        assert!(validate_metadata_key("user:id").is_err());
        assert!(validate_metadata_key("user/id").is_err());
        assert!(validate_metadata_key("usér").is_err());
    }

    #[test]
    fn test_validate_metadata_key_empty() {
        assert_eq!(validate_metadata_key(""), Err(MetadataError::EmptyKey));
    }

    #[test]
    fn test_validate_metadata_value() {
        assert!(validate_metadata_value("k", "plain value").is_ok());
        assert!(validate_metadata_value("k", "").is_ok());
        assert_eq!(
            validate_metadata_value("k", "line\nbreak"),
            Err(MetadataError::InvalidValue("k".to_string()))
        );
    }

    #[test]
    fn test_validate_user_metadata_valid() {
        let metadata = HashMap::from([
            ("userId".to_string(), "123".to_string()),
            ("category".to_string(), "profile".to_string()),
        ]);
        assert!(validate_user_metadata(&metadata).is_ok());
        assert_eq!(metadata_size(&metadata), 6 + 3 + 8 + 7);
    }

    #[test]
    fn test_validate_user_metadata_too_large() {
        let metadata = HashMap::from([("blob".to_string(), "a".repeat(MAX_METADATA_SIZE))]);
        assert_eq!(
            validate_user_metadata(&metadata),
            Err(MetadataError::TooLarge {
                size: MAX_METADATA_SIZE + 4,
                limit: MAX_METADATA_SIZE,
            })
        );
    }

    #[test]
    fn test_validate_user_metadata_at_limit() {
        let metadata = HashMap::from([("k".to_string(), "a".repeat(MAX_METADATA_SIZE - 1))]);
        assert!(validate_user_metadata(&metadata).is_ok());
    }

    #[test]
    fn test_validate_user_metadata_invalid_key() {
        let metadata = HashMap::from([("user id".to_string(), "123".to_string())]);
        assert!(matches!(
            validate_user_metadata(&metadata),
            Err(MetadataError::InvalidKey(_))
        ));
    }
}
