//! s3form Storage Library
//!
//! This crate streams file fields of `multipart/form-data` requests into object
//! storage. It provides:
//!
//! - `S3Storage`, the storage engine: it resolves bucket, key, content type and
//!   the other object options per file, sanitizes SVG uploads and reports each
//!   stored object as an `UploadedFile`;
//! - `MultipartUpload`, the driver that parses request bodies with `multer` and
//!   calls the engine for every file field;
//! - the `S3Client` backends: the AWS SDK (`storage-s3`) and `object_store`
//!   (`storage-object-store`, covering S3-compatible services, local directories
//!   and memory), plus the `MockS3` double (`test-export-mocks`).
//!
//! # Object keys
//!
//! Keys default to 32 random hex characters. Keys from a strategy are used as
//! given, as long as they are not empty; key generation lives in the `keys` module.

pub mod content_type;
pub mod engine;
pub mod factory;
pub mod keys;
#[cfg(any(test, feature = "test-export-mocks"))]
pub mod mock;
pub mod multipart;
pub mod options;
#[cfg(feature = "storage-s3")]
pub mod s3;
#[cfg(feature = "storage-object-store")]
pub mod store;
pub mod svg;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use engine::{S3Storage, S3StorageBuilder};
pub use factory::{create_client, create_storage};
#[cfg(any(test, feature = "test-export-mocks"))]
pub use mock::MockS3;
pub use multipart::{FileSelector, MultipartUpload, ParsedForm};
pub use options::{ContentTypeStrategy, Setting};
#[cfg(feature = "storage-s3")]
pub use s3::AwsS3Client;
pub use s3form_core::StorageBackend;
#[cfg(feature = "storage-object-store")]
pub use store::ObjectStoreClient;
#[cfg(any(test, feature = "test-export-mocks"))]
pub use traits::{MockS3Client, MockStorageEngine};
pub use traits::{S3Client, StorageEngine, StorageError, StorageResult};
pub use types::{
    FileInfo, FileStream, IncomingFile, RequestContext, UploadBody, UploadOutput, UploadParams,
    UploadProgress, UploadRequest, UploadedFile,
};
