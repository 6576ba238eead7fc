//! s3form Core Library
//!
//! This crate provides the configuration, error types and validation that are
//! shared by the s3form storage engine and its backends.

pub mod config;
pub mod error;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{ContentTypeSetting, KeyStrategy, StorageConfig, StorageSettings};
pub use error::{ConfigError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
pub use validation::MetadataError;
