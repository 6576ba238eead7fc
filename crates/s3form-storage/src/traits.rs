//! Storage abstraction traits
//!
//! `StorageEngine` is what a multipart driver calls for every file field;
//! `S3Client` is what an engine calls to reach object storage.

use std::io;

use async_trait::async_trait;
use s3form_core::{ConfigError, ErrorMetadata, LogLevel, MetadataError};
use thiserror::Error;

use crate::types::{IncomingFile, RequestContext, UploadOutput, UploadRequest, UploadedFile};

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("File too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Failed to read file stream: {0}")]
    Stream(String),

    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    #[error("Unexpected file field: {0}")]
    UnexpectedField(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(#[from] MetadataError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl StorageError {
    /// Classify an error raised while reading a file stream
    ///
    /// Size limits enforced by the multipart parser surface as `PayloadTooLarge`.
    pub fn from_stream_error(err: io::Error) -> Self {
        if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<multer::Error>()) {
            return StorageError::from(clone_multer_error(inner));
        }
        StorageError::Stream(err.to_string())
    }
}

// multer::Error is not Clone; only the variants that matter are rebuilt.
fn clone_multer_error(err: &multer::Error) -> multer::Error {
    match err {
        multer::Error::FieldSizeExceeded { limit, field_name } => {
            multer::Error::FieldSizeExceeded {
                limit: *limit,
                field_name: field_name.clone(),
            }
        }
        multer::Error::StreamSizeExceeded { limit } => {
            multer::Error::StreamSizeExceeded { limit: *limit }
        }
        other => multer::Error::StreamReadFailed(other.to_string().into()),
    }
}

impl From<multer::Error> for StorageError {
    fn from(err: multer::Error) -> Self {
        match err {
            multer::Error::FieldSizeExceeded { limit, .. }
            | multer::Error::StreamSizeExceeded { limit } => {
                StorageError::PayloadTooLarge { limit }
            }
            multer::Error::StreamReadFailed(e) => StorageError::Stream(e.to_string()),
            other => StorageError::Multipart(other.to_string()),
        }
    }
}

impl ErrorMetadata for StorageError {
    fn http_status_code(&self) -> u16 {
        match self {
            StorageError::PayloadTooLarge { .. } => 413,
            StorageError::Multipart(_)
            | StorageError::UnexpectedField(_)
            | StorageError::InvalidKey(_)
            | StorageError::InvalidMetadata(_)
            | StorageError::Stream(_) => 400,
            StorageError::UploadFailed(_)
            | StorageError::DeleteFailed(_)
            | StorageError::BackendError(_) => 502,
            StorageError::Config(_) | StorageError::IoError(_) => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            StorageError::UploadFailed(_) => "UPLOAD_FAILED",
            StorageError::DeleteFailed(_) => "DELETE_FAILED",
            StorageError::BackendError(_) => "STORAGE_BACKEND_ERROR",
            StorageError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            StorageError::Stream(_) => "STREAM_ERROR",
            StorageError::Multipart(_) => "MALFORMED_MULTIPART",
            StorageError::UnexpectedField(_) => "UNEXPECTED_FIELD",
            StorageError::InvalidKey(_) => "INVALID_KEY",
            StorageError::InvalidMetadata(_) => "INVALID_METADATA",
            StorageError::Config(e) => e.error_code(),
            StorageError::IoError(_) => "IO_ERROR",
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            StorageError::PayloadTooLarge { .. } => "entity.too.large",
            StorageError::Multipart(_) | StorageError::Stream(_) => "request.malformed",
            StorageError::UnexpectedField(_) => "field.unexpected",
            StorageError::InvalidKey(_) | StorageError::InvalidMetadata(_) => "request.invalid",
            StorageError::Config(e) => e.error_type(),
            StorageError::UploadFailed(_)
            | StorageError::DeleteFailed(_)
            | StorageError::BackendError(_)
            | StorageError::IoError(_) => "storage.failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::UploadFailed(_) | StorageError::DeleteFailed(_) | StorageError::BackendError(_)
        )
    }

    fn log_level(&self) -> LogLevel {
        match self {
            StorageError::PayloadTooLarge { .. } => LogLevel::Warn,
            StorageError::Multipart(_)
            | StorageError::UnexpectedField(_)
            | StorageError::InvalidKey(_)
            | StorageError::InvalidMetadata(_)
            | StorageError::Stream(_) => LogLevel::Debug,
            _ => LogLevel::Error,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object storage client
///
/// Implemented by the AWS SDK backend, the object_store backends and the
/// in-memory `MockS3` double, so engines never depend on a concrete client.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait S3Client: Send + Sync {
    /// Upload one object, consuming the request body
    async fn upload(&self, request: UploadRequest) -> StorageResult<UploadOutput>;

    /// Delete one object
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;
}

/// Storage engine driven by a multipart form handler
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Store one file field and describe where it went
    async fn handle_file(
        &self,
        request: &RequestContext,
        file: IncomingFile,
    ) -> StorageResult<UploadedFile>;

    /// Remove a file previously stored by `handle_file`
    async fn remove_file(&self, request: &RequestContext, file: &UploadedFile)
        -> StorageResult<()>;
}
