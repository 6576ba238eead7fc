//! In-memory stand-in for an S3 client
//!
//! Reads every body fully, reports a single progress event and answers with a
//! fixed location and etag. Every call is recorded for assertions.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::traits::{S3Client, StorageError, StorageResult};
use crate::types::{UploadOutput, UploadParams, UploadProgress, UploadRequest};

pub const MOCK_LOCATION: &str = "mock-location";
pub const MOCK_ETAG: &str = "mock-etag";

/// What `MockS3` saw for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub acl: Option<String>,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
    pub storage_class: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    pub body: Bytes,
}

#[derive(Debug, Default)]
pub struct MockS3 {
    uploads: Mutex<Vec<RecordedUpload>>,
    deletes: Mutex<Vec<(String, String)>>,
}

impl MockS3 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(bucket, key)` pairs passed to `delete`, in call order
    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl S3Client for MockS3 {
    async fn upload(&self, request: UploadRequest) -> StorageResult<UploadOutput> {
        let UploadRequest { params, body } = request;
        let UploadParams {
            bucket,
            key,
            content_type,
            acl,
            server_side_encryption,
            sse_kms_key_id,
            storage_class,
            metadata,
            progress,
            ..
        } = params;

        let data = body.collect().await.map_err(StorageError::from_stream_error)?;
        let total = data.len() as u64;

        if let Some(listener) = progress {
            listener(UploadProgress {
                loaded: total,
                total: Some(total),
            });
        }

        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedUpload {
                bucket,
                key,
                content_type,
                acl,
                server_side_encryption,
                sse_kms_key_id,
                storage_class,
                metadata,
                body: data,
            });

        Ok(UploadOutput {
            location: MOCK_LOCATION.to_string(),
            etag: MOCK_ETAG.to_string(),
            version_id: None,
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((bucket.to_string(), key.to_string()));
        Ok(())
    }
}
