//! Object key generation
//!
//! Generated keys never start with `/` and never contain `..` segments, whatever
//! filename the client sent.

use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// 32 random hex characters
pub fn random_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A prefix followed by a random key
pub fn prefixed_key(prefix: &str) -> String {
    format!("{}{}", prefix, random_key())
}

/// The client's filename reduced to a safe key
///
/// Path components are dropped and anything outside `[A-Za-z0-9._-]` becomes `_`.
/// Falls back to a random key when nothing usable is left.
pub fn original_name_key(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim_matches('.').is_empty() {
        random_key()
    } else {
        sanitized
    }
}

/// Reject keys no backend can store
///
/// Keys are otherwise passed through as given; object stores treat `/` and
/// `..` as ordinary characters.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key is empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_key_shape() {
        let key = random_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, random_key());
    }

    #[test]
    fn test_prefixed_key() {
        let key = prefixed_key("avatars/");
        assert!(key.starts_with("avatars/"));
        assert_eq!(key.len(), "avatars/".len() + 32);
    }

    #[test]
    fn test_original_name_key() {
        assert_eq!(original_name_key("ffffff.png"), "ffffff.png");
        assert_eq!(original_name_key("../../etc/passwd"), "passwd");
        assert_eq!(original_name_key("C:\\Users\\me\\my photo.jpg"), "my_photo.jpg");
        assert_eq!(original_name_key("résumé.pdf"), "r_sum_.pdf");
        assert_eq!(original_name_key("..").len(), 32);
        assert_eq!(original_name_key("").len(), 32);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("uploads/a.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/a.png").is_ok());
        assert!(validate_key("uploads/../a.png").is_ok());
    }
}
