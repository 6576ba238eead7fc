use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::ConfigError;

/// Storage backend types
///
/// Selects which client the factory builds for an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// AWS S3 through the official SDK.
    #[default]
    S3,
    /// Local filesystem through `object_store`.
    Local,
    /// Process memory through `object_store`; contents are lost on drop.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::InvalidValue {
                option: "STORAGE_BACKEND".to_string(),
                message: format!("unknown storage backend '{}'", s),
            }),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}
