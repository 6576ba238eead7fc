//! `object_store` backends: S3-compatible services, local filesystem, memory
//!
//! An `object_store` store is bound to a single bucket (or directory), so the
//! client rejects requests addressed to any other bucket. Object ACLs and
//! server-side encryption have no `object_store` equivalent and are ignored; the
//! local filesystem store also keeps no content type, headers or metadata.

use std::borrow::Cow;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
};

use crate::traits::{S3Client, StorageError, StorageResult};
use crate::types::{UploadOutput, UploadParams, UploadRequest};

/// How object locations are reported
#[derive(Debug, Clone, PartialEq, Eq)]
enum Locator {
    /// `memory://{bucket}/{key}`
    Memory,
    /// `https://{bucket}.s3.{region}.amazonaws.com/{key}`
    VirtualHosted { region: String },
    /// `{base}/{bucket}/{key}`
    PathStyle(String),
    /// `{base}/{key}`
    Flat(String),
}

/// S3 client on top of any `object_store` store
#[derive(Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    locator: Locator,
    /// `LocalFileSystem` rejects puts that carry attributes
    supports_attributes: bool,
}

impl ObjectStoreClient {
    /// In-memory store; locations look like `memory://{bucket}/{key}`
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        ObjectStoreClient {
            store: Arc::new(InMemory::new()),
            bucket: bucket.into(),
            locator: Locator::Memory,
            supports_attributes: true,
        }
    }

    /// Local directory store
    ///
    /// Locations use `base_url` when given, otherwise a `file://` URL.
    pub fn local(
        bucket: impl Into<String>,
        root: impl AsRef<FsPath>,
        base_url: Option<String>,
    ) -> StorageResult<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        let base = match base_url {
            Some(url) => url,
            None => format!("file://{}", root.canonicalize()?.display()),
        };

        Ok(ObjectStoreClient {
            store: Arc::new(store),
            bucket: bucket.into(),
            locator: Locator::Flat(base),
            supports_attributes: false,
        })
    }

    /// S3 or an S3-compatible service, credentials from the environment
    pub fn s3(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let bucket = bucket.into();
        let region = region.into();

        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        let locator = match endpoint_url {
            Some(endpoint) => Locator::PathStyle(endpoint),
            None => Locator::VirtualHosted { region },
        };

        Ok(ObjectStoreClient {
            store: Arc::new(store),
            bucket,
            locator,
            supports_attributes: true,
        })
    }

    /// Wrap an arbitrary store bound to `bucket`
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        base_url: String,
    ) -> Self {
        ObjectStoreClient {
            store,
            bucket: bucket.into(),
            locator: Locator::Flat(base_url),
            supports_attributes: true,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Read a stored object back
    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Path::from(key);
        let result = ObjectStoreExt::get(&self.store, &location)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        result
            .bytes()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))
    }

    fn generate_url(&self, key: &str) -> String {
        let key = urlencoding::encode(key).replace("%2F", "/");
        match self.locator {
            Locator::Memory => format!("memory://{}/{}", self.bucket, key),
            Locator::VirtualHosted { ref region } => {
                format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, region, key)
            }
            Locator::PathStyle(ref base) => {
                format!("{}/{}/{}", base.trim_end_matches('/'), self.bucket, key)
            }
            Locator::Flat(ref base) => format!("{}/{}", base.trim_end_matches('/'), key),
        }
    }

    fn check_bucket(&self, bucket: &str) -> StorageResult<()> {
        if bucket != self.bucket {
            return Err(StorageError::BackendError(format!(
                "client is bound to bucket '{}', not '{}'",
                self.bucket, bucket
            )));
        }
        Ok(())
    }
}

fn attributes(request: &UploadParams) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(
        Attribute::ContentType,
        AttributeValue::from(request.content_type.clone()),
    );
    let optional = [
        (Attribute::CacheControl, &request.cache_control),
        (Attribute::ContentDisposition, &request.content_disposition),
        (Attribute::ContentEncoding, &request.content_encoding),
    ];
    for (attribute, value) in optional {
        if let Some(value) = value {
            attributes.insert(attribute, AttributeValue::from(value.clone()));
        }
    }
    if let Some(ref metadata) = request.metadata {
        for (key, value) in metadata {
            attributes.insert(
                Attribute::Metadata(Cow::Owned(key.clone())),
                AttributeValue::from(value.clone()),
            );
        }
    }
    attributes
}

#[async_trait]
impl S3Client for ObjectStoreClient {
    async fn upload(&self, request: UploadRequest) -> StorageResult<UploadOutput> {
        let UploadRequest { params, body } = request;
        self.check_bucket(&params.bucket)?;

        // private / STANDARD are what object_store gives anyway
        if params.acl.as_deref().is_some_and(|acl| acl != "private")
            || params.server_side_encryption.is_some()
            || params
                .storage_class
                .as_deref()
                .is_some_and(|class| class != "STANDARD")
        {
            tracing::warn!(
                bucket = %params.bucket,
                key = %params.key,
                "object_store backend ignores ACL, encryption and storage class"
            );
        }

        let start = Instant::now();
        let opts = if self.supports_attributes {
            PutOptions {
                attributes: attributes(&params),
                ..PutOptions::default()
            }
        } else {
            tracing::warn!(
                bucket = %params.bucket,
                key = %params.key,
                content_type = %params.content_type,
                "Local filesystem backend drops content type, caching headers and metadata"
            );
            PutOptions::default()
        };
        let location = Path::from(params.key.as_str());

        let UploadParams {
            bucket,
            key,
            progress,
            ..
        } = params;

        let data = body.collect().await.map_err(StorageError::from_stream_error)?;
        let size = data.len() as u64;

        let result = self
            .store
            .put_opts(&location, PutPayload::from(data), opts)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object store upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        if let Some(listener) = progress {
            listener(crate::types::UploadProgress {
                loaded: size,
                total: Some(size),
            });
        }

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store upload successful"
        );

        Ok(UploadOutput {
            location: self.generate_url(&key),
            etag: result.e_tag.unwrap_or_default(),
            version_id: result.version,
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.check_bucket(bucket)?;
        let start = Instant::now();
        let location = Path::from(key);

        ObjectStoreExt::delete(&self.store, &location)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object store delete failed"
                );
                StorageError::DeleteFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store delete successful"
        );

        Ok(())
    }
}
