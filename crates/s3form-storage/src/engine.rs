//! The S3 storage engine
//!
//! `S3Storage` turns every file field handed over by a multipart driver into one
//! upload request, sends it through an `S3Client` and describes the stored
//! object as an `UploadedFile`.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use s3form_core::validation::validate_user_metadata;
use s3form_core::{ConfigError, KeyStrategy, StorageConfig, StorageSettings};
use tokio::sync::OnceCell;

use crate::content_type::{self, is_svg_content_type};
use crate::factory;
use crate::keys;
use crate::options::{self, key_fn, ContentTypeStrategy, KeyFn, Setting};
use crate::svg;
use crate::traits::{S3Client, StorageEngine, StorageError, StorageResult};
use crate::types::{
    FileInfo, FileStream, IncomingFile, ProgressListener, RequestContext, UploadBody,
    UploadParams, UploadProgress, UploadRequest, UploadedFile,
};

pub const DEFAULT_ACL: &str = "private";
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

enum ClientHandle {
    Ready(Arc<dyn S3Client>),
    /// Built from configuration on first use
    Deferred {
        config: StorageConfig,
        cell: OnceCell<Arc<dyn S3Client>>,
    },
}

/// Storage engine streaming uploads to S3
pub struct S3Storage {
    bucket: Setting<String>,
    key: KeyFn,
    content_type: ContentTypeStrategy,
    acl: Setting<String>,
    server_side_encryption: Option<Setting<String>>,
    sse_kms_key_id: Option<String>,
    storage_class: String,
    cache_control: Option<String>,
    content_disposition: Option<String>,
    content_encoding: Option<String>,
    metadata: Option<Setting<HashMap<String, String>>>,
    svg_file_size_limit: Option<u64>,
    on_progress: Option<ProgressListener>,
    client: ClientHandle,
}

impl S3Storage {
    pub fn builder() -> S3StorageBuilder {
        S3StorageBuilder::default()
    }

    /// Build an engine from declarative settings and a client
    pub fn from_settings(
        settings: StorageSettings,
        client: Arc<dyn S3Client>,
    ) -> Result<Self, ConfigError> {
        S3StorageBuilder::from_settings(settings).client(client).build()
    }

    async fn client(&self) -> StorageResult<&Arc<dyn S3Client>> {
        match self.client {
            ClientHandle::Ready(ref client) => Ok(client),
            ClientHandle::Deferred {
                ref config,
                ref cell,
            } => {
                cell.get_or_try_init(|| factory::create_client(config))
                    .await
            }
        }
    }

    fn resolve_options(
        &self,
        request: &RequestContext,
        file: &FileInfo,
    ) -> StorageResult<ResolvedOptions> {
        let bucket = self.bucket.resolve(request, file)?;
        let key = (self.key)(request, file)?;
        keys::validate_key(&key)?;

        let metadata = self
            .metadata
            .as_ref()
            .map(|setting| setting.resolve(request, file))
            .transpose()?;
        if let Some(ref metadata) = metadata {
            validate_user_metadata(metadata)?;
        }

        Ok(ResolvedOptions {
            bucket,
            key,
            acl: self.acl.resolve(request, file)?,
            server_side_encryption: self
                .server_side_encryption
                .as_ref()
                .map(|setting| setting.resolve(request, file))
                .transpose()?,
            metadata,
        })
    }

    async fn read_svg(&self, mut stream: FileStream) -> StorageResult<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(StorageError::from_stream_error)?;
            buffer.extend_from_slice(&chunk);
            if let Some(limit) = self.svg_file_size_limit {
                if buffer.len() as u64 > limit {
                    return Err(StorageError::PayloadTooLarge { limit });
                }
            }
        }
        Ok(buffer.freeze())
    }
}

impl fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("content_type", &self.content_type)
            .field("acl", &self.acl)
            .field("server_side_encryption", &self.server_side_encryption)
            .field("storage_class", &self.storage_class)
            .field("svg_file_size_limit", &self.svg_file_size_limit)
            .finish_non_exhaustive()
    }
}

struct ResolvedOptions {
    bucket: String,
    key: String,
    acl: String,
    server_side_encryption: Option<String>,
    metadata: Option<HashMap<String, String>>,
}

/// Counts bytes passing through a stream and keeps its first error
#[derive(Clone, Default)]
struct StreamMonitor {
    bytes: Arc<AtomicU64>,
    error: Arc<Mutex<Option<StorageError>>>,
}

impl StreamMonitor {
    fn wrap(&self, stream: FileStream) -> FileStream {
        let monitor = self.clone();
        stream
            .map(move |chunk| match chunk {
                Ok(bytes) => {
                    monitor.bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    Ok(bytes)
                }
                Err(e) => {
                    let forwarded = io::Error::new(e.kind(), e.to_string());
                    monitor.record(StorageError::from_stream_error(e));
                    Err(forwarded)
                }
            })
            .boxed()
    }

    fn record(&self, err: StorageError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take_error(&self) -> Option<StorageError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StorageEngine for S3Storage {
    async fn handle_file(
        &self,
        request: &RequestContext,
        file: IncomingFile,
    ) -> StorageResult<UploadedFile> {
        let IncomingFile { info, stream } = file;
        let options = self.resolve_options(request, &info)?;

        let (content_type, stream) = match self.content_type.resolve_static(request, &info)? {
            Some(content_type) => (content_type, stream),
            None => {
                let (prefix, stream) = content_type::peek(stream)
                    .await
                    .map_err(StorageError::from_stream_error)?;
                (content_type::detect(&prefix), stream)
            }
        };
        tracing::debug!(
            field = %info.field_name,
            key = %options.key,
            content_type = %content_type,
            "Resolved content type"
        );

        let monitor = StreamMonitor::default();
        let body = if is_svg_content_type(&content_type) {
            let raw = self.read_svg(stream).await?;
            let sanitized = svg::sanitize_bytes(&raw);
            tracing::debug!(
                key = %options.key,
                original_bytes = raw.len(),
                sanitized_bytes = sanitized.len(),
                "Sanitized SVG upload"
            );
            UploadBody::Bytes(Bytes::from(sanitized))
        } else {
            UploadBody::Stream(monitor.wrap(stream))
        };
        let known_size = body.known_length();

        let upload = UploadRequest {
            params: UploadParams {
                content_type: content_type.clone(),
                acl: Some(options.acl.clone()),
                server_side_encryption: options.server_side_encryption.clone(),
                sse_kms_key_id: self.sse_kms_key_id.clone(),
                storage_class: Some(self.storage_class.clone()),
                cache_control: self.cache_control.clone(),
                content_disposition: self.content_disposition.clone(),
                content_encoding: self.content_encoding.clone(),
                metadata: options.metadata.clone(),
                progress: self.on_progress.clone(),
                ..UploadParams::new(options.bucket.clone(), options.key.clone())
            },
            body,
        };

        let start = Instant::now();
        let output = match self.client().await?.upload(upload).await {
            Ok(output) => output,
            Err(e) => {
                // client stream errors take precedence over the backend's
                let e = monitor.take_error().unwrap_or(e);
                tracing::error!(
                    error = %e,
                    bucket = %options.bucket,
                    key = %options.key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "File upload failed"
                );
                return Err(e);
            }
        };

        let size = known_size.unwrap_or_else(|| monitor.bytes());
        tracing::info!(
            bucket = %options.bucket,
            key = %options.key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File stored"
        );

        Ok(UploadedFile {
            field_name: info.field_name,
            original_name: info.original_name,
            encoding: info.encoding,
            mime_type: info.mime_type,
            size,
            bucket: options.bucket,
            key: options.key,
            acl: Some(options.acl),
            content_type,
            content_disposition: self.content_disposition.clone(),
            content_encoding: self.content_encoding.clone(),
            storage_class: Some(self.storage_class.clone()),
            metadata: options.metadata,
            location: output.location,
            etag: output.etag,
            version_id: output.version_id,
            server_side_encryption: options.server_side_encryption,
        })
    }

    async fn remove_file(
        &self,
        _request: &RequestContext,
        file: &UploadedFile,
    ) -> StorageResult<()> {
        tracing::debug!(bucket = %file.bucket, key = %file.key, "Removing stored file");
        self.client().await?.delete(&file.bucket, &file.key).await
    }
}

/// Builder for `S3Storage`
///
/// Only the bucket and a way to reach a client are required:
///
/// ```no_run
/// use std::sync::Arc;
/// use s3form_storage::{ObjectStoreClient, S3Storage};
///
/// let storage = S3Storage::builder()
///     .bucket("uploads")
///     .server_side_encryption("AES256")
///     .client(Arc::new(ObjectStoreClient::in_memory("uploads")))
///     .build()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct S3StorageBuilder {
    bucket: Option<Setting<String>>,
    key: Option<KeyFn>,
    content_type: ContentTypeStrategy,
    acl: Option<Setting<String>>,
    server_side_encryption: Option<Setting<String>>,
    sse_kms_key_id: Option<String>,
    storage_class: Option<String>,
    cache_control: Option<String>,
    content_disposition: Option<String>,
    content_encoding: Option<String>,
    metadata: Option<Setting<HashMap<String, String>>>,
    svg_file_size_limit: Option<u64>,
    on_progress: Option<ProgressListener>,
    client: Option<Arc<dyn S3Client>>,
    config: Option<StorageConfig>,
}

impl S3StorageBuilder {
    /// Start from declarative settings
    pub fn from_settings(settings: StorageSettings) -> Self {
        let mut builder = S3StorageBuilder::default();
        builder.bucket = settings.bucket.map(Setting::Value);
        builder.key = settings.key.map(key_fn);
        builder.content_type = settings.content_type.map(Into::into).unwrap_or_default();
        builder.acl = settings.acl.map(Setting::Value);
        builder.server_side_encryption = settings.server_side_encryption.map(Setting::Value);
        builder.sse_kms_key_id = settings.sse_kms_key_id;
        builder.storage_class = settings.storage_class;
        builder.cache_control = settings.cache_control;
        builder.content_disposition = settings.content_disposition;
        builder.content_encoding = settings.content_encoding;
        builder.metadata = settings.metadata.map(Setting::Value);
        builder.svg_file_size_limit = settings.svg_file_size_limit;
        builder
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(Setting::Value(bucket.into()));
        self
    }

    /// Choose the bucket per request and file
    pub fn bucket_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> StorageResult<String> + Send + Sync + 'static,
    {
        self.bucket = Some(Setting::dynamic(f));
        self
    }

    /// Choose the object key per request and file; the default is 32 random hex characters
    pub fn key_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> StorageResult<String> + Send + Sync + 'static,
    {
        self.key = Some(options::strategy(f));
        self
    }

    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key = Some(key_fn(strategy));
        self
    }

    pub fn content_type(mut self, strategy: ContentTypeStrategy) -> Self {
        self.content_type = strategy;
        self
    }

    pub fn content_type_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> StorageResult<String> + Send + Sync + 'static,
    {
        self.content_type = ContentTypeStrategy::Custom(options::strategy(f));
        self
    }

    pub fn acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = Some(Setting::Value(acl.into()));
        self
    }

    pub fn acl_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> StorageResult<String> + Send + Sync + 'static,
    {
        self.acl = Some(Setting::dynamic(f));
        self
    }

    /// Any value is passed to the backend as is, e.g. `AES256` or `aws:kms`
    pub fn server_side_encryption(mut self, mode: impl Into<String>) -> Self {
        self.server_side_encryption = Some(Setting::Value(mode.into()));
        self
    }

    pub fn server_side_encryption_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> StorageResult<String> + Send + Sync + 'static,
    {
        self.server_side_encryption = Some(Setting::dynamic(f));
        self
    }

    pub fn sse_kms_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.sse_kms_key_id = Some(key_id.into());
        self
    }

    pub fn storage_class(mut self, storage_class: impl Into<String>) -> Self {
        self.storage_class = Some(storage_class.into());
        self
    }

    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    pub fn content_disposition(mut self, value: impl Into<String>) -> Self {
        self.content_disposition = Some(value.into());
        self
    }

    pub fn content_encoding(mut self, value: impl Into<String>) -> Self {
        self.content_encoding = Some(value.into());
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(Setting::Value(metadata));
        self
    }

    pub fn metadata_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> StorageResult<HashMap<String, String>>
            + Send
            + Sync
            + 'static,
    {
        self.metadata = Some(Setting::dynamic(f));
        self
    }

    /// Maximum size of an SVG before sanitization, in bytes
    pub fn svg_file_size_limit(mut self, limit: u64) -> Self {
        self.svg_file_size_limit = Some(limit);
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn client(mut self, client: Arc<dyn S3Client>) -> Self {
        self.client = Some(client);
        self
    }

    /// Backend configuration; used for the bucket when none is set, and to
    /// construct a client on first upload when none is given
    pub fn config(mut self, config: StorageConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<S3Storage, ConfigError> {
        let bucket = match self.bucket {
            Some(bucket) => bucket,
            None => self
                .config
                .as_ref()
                .and_then(|config| config.bucket.clone())
                .map(Setting::Value)
                .ok_or(ConfigError::MissingOption("bucket"))?,
        };
        if let Setting::Value(ref name) = bucket {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    option: "bucket".to_string(),
                    message: "bucket name is empty".to_string(),
                });
            }
        }

        let client = match (self.client, self.config) {
            (Some(client), _) => ClientHandle::Ready(client),
            (None, Some(config)) => {
                config.validate()?;
                ClientHandle::Deferred {
                    config,
                    cell: OnceCell::new(),
                }
            }
            (None, None) => return Err(ConfigError::MissingClient),
        };

        Ok(S3Storage {
            bucket,
            key: self.key.unwrap_or_else(|| key_fn(KeyStrategy::Random)),
            content_type: self.content_type,
            acl: self.acl.unwrap_or_else(|| DEFAULT_ACL.into()),
            server_side_encryption: self.server_side_encryption,
            sse_kms_key_id: self.sse_kms_key_id,
            storage_class: self
                .storage_class
                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
            cache_control: self.cache_control,
            content_disposition: self.content_disposition,
            content_encoding: self.content_encoding,
            metadata: self.metadata,
            svg_file_size_limit: self.svg_file_size_limit,
            on_progress: self.on_progress,
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockS3, MOCK_ETAG, MOCK_LOCATION};
    use crate::traits::MockS3Client;
    use futures::stream;
    use s3form_core::{ErrorMetadata, StorageBackend};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";

    fn context() -> RequestContext {
        http::Request::builder()
            .method("POST")
            .uri("/upload")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn info(field: &str, name: &str, mime: &str) -> FileInfo {
        FileInfo {
            field_name: field.to_string(),
            original_name: name.to_string(),
            encoding: "7bit".to_string(),
            mime_type: mime.to_string(),
        }
    }

    fn chunked(data: &'static [u8], chunk: usize) -> FileStream {
        let chunks: Vec<io::Result<Bytes>> = data
            .chunks(chunk)
            .map(|c| Ok(Bytes::from_static(c)))
            .collect();
        stream::iter(chunks).boxed()
    }

    #[test]
    fn test_build_requires_bucket_and_client() {
        let err = S3Storage::builder()
            .client(Arc::new(MockS3::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption("bucket")));

        let err = S3Storage::builder().bucket("uploads").build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingClient));

        let err = S3Storage::builder()
            .bucket(" ")
            .client(Arc::new(MockS3::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_build_deferred_client_validates_config() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            bucket: Some("uploads".to_string()),
            ..StorageConfig::default()
        };
        assert!(S3Storage::builder().config(config).build().is_ok());

        let missing_region = StorageConfig {
            bucket: Some("uploads".to_string()),
            ..StorageConfig::default()
        };
        assert!(matches!(
            S3Storage::builder().config(missing_region).build(),
            Err(ConfigError::MissingOption("region"))
        ));
    }

    #[tokio::test]
    async fn test_handle_file_defaults() {
        let mock = Arc::new(MockS3::new());
        let storage = S3Storage::builder()
            .bucket("uploads")
            .client(mock.clone())
            .build()
            .unwrap();

        let file = IncomingFile::new(info("image", "pixel.png", "image/png"), chunked(PNG, 5));
        let stored = storage.handle_file(&context(), file).await.unwrap();

        assert_eq!(stored.size, PNG.len() as u64);
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.acl.as_deref(), Some(DEFAULT_ACL));
        assert_eq!(stored.storage_class.as_deref(), Some(DEFAULT_STORAGE_CLASS));
        assert_eq!(stored.key.len(), 32);
        assert_eq!(stored.location, MOCK_LOCATION);
        assert_eq!(stored.etag, MOCK_ETAG);
        assert_eq!(stored.server_side_encryption, None);

        let uploads = mock.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(&uploads[0].body[..], PNG);
        assert_eq!(uploads[0].key, stored.key);
    }

    #[tokio::test]
    async fn test_handle_file_with_strategies() {
        let mock = Arc::new(MockS3::new());
        let storage = S3Storage::builder()
            .bucket_with(|_, file| Ok(format!("{}-bucket", file.field_name)))
            .key_with(|req, file| {
                let path = req.uri.path().trim_start_matches('/');
                Ok(format!("{}{}", path, file.original_name))
            })
            .content_type(ContentTypeStrategy::Default)
            .acl("public-read")
            .server_side_encryption("aws:kms")
            .sse_kms_key_id("alias/uploads")
            .metadata_with(|_, file| {
                Ok(HashMap::from([("field".to_string(), file.field_name.clone())]))
            })
            .client(mock.clone())
            .build()
            .unwrap();

        let file = IncomingFile::from_bytes(info("doc", "/a.txt", "text/plain"), "hello");
        let stored = storage.handle_file(&context(), file).await.unwrap();

        assert_eq!(stored.bucket, "doc-bucket");
        assert_eq!(stored.key, "upload/a.txt");
        assert_eq!(stored.content_type, content_type::DEFAULT_CONTENT_TYPE);
        assert_eq!(stored.server_side_encryption.as_deref(), Some("aws:kms"));

        let upload = &mock.uploads()[0];
        assert_eq!(upload.acl.as_deref(), Some("public-read"));
        assert_eq!(upload.sse_kms_key_id.as_deref(), Some("alias/uploads"));
        assert_eq!(
            upload.metadata.as_ref().and_then(|m| m.get("field")).map(String::as_str),
            Some("doc")
        );
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected_before_upload() {
        let mut client = MockS3Client::new();
        client.expect_upload().never();
        let storage = S3Storage::builder()
            .bucket("uploads")
            .key_with(|_, _| Ok(String::new()))
            .client(Arc::new(client))
            .build()
            .unwrap();

        let file = IncomingFile::from_bytes(info("f", "a", "text/plain"), "x");
        let err = storage.handle_file(&context(), file).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_caller_keys_are_passed_through() {
        let mock = Arc::new(MockS3::new());
        let storage = S3Storage::builder()
            .bucket("uploads")
            .key_with(|_, file| Ok(format!("/shared/../{}", file.original_name)))
            .client(mock.clone())
            .build()
            .unwrap();

        let file = IncomingFile::from_bytes(info("f", "a.txt", "text/plain"), "x");
        let stored = storage.handle_file(&context(), file).await.unwrap();

        assert_eq!(stored.key, "/shared/../a.txt");
        assert_eq!(mock.uploads()[0].key, "/shared/../a.txt");
    }

    #[tokio::test]
    async fn test_invalid_metadata_is_rejected() {
        let storage = S3Storage::builder()
            .bucket("uploads")
            .metadata(HashMap::from([("bad key".to_string(), "v".to_string())]))
            .client(Arc::new(MockS3::new()))
            .build()
            .unwrap();

        let file = IncomingFile::from_bytes(info("f", "a", "text/plain"), "x");
        let err = storage.handle_file(&context(), file).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidMetadata(_)));
    }

    #[tokio::test]
    async fn test_svg_is_sanitized() {
        let mock = Arc::new(MockS3::new());
        let storage = S3Storage::builder()
            .bucket("uploads")
            .client(mock.clone())
            .build()
            .unwrap();

        let svg: &'static [u8] = b"<svg onload=\"alert(1)\"><script>alert(2)</script><rect/></svg>";
        let file = IncomingFile::new(info("icon", "x.svg", "image/svg+xml"), chunked(svg, 7));
        let stored = storage.handle_file(&context(), file).await.unwrap();

        assert_eq!(stored.content_type, content_type::SVG_CONTENT_TYPE);
        assert_eq!(&mock.uploads()[0].body[..], b"<svg><rect/></svg>");
        assert_eq!(stored.size, b"<svg><rect/></svg>".len() as u64);
    }

    #[tokio::test]
    async fn test_svg_over_limit_is_not_uploaded() {
        let mut client = MockS3Client::new();
        client.expect_upload().never();
        let storage = S3Storage::builder()
            .bucket("uploads")
            .svg_file_size_limit(1)
            .client(Arc::new(client))
            .build()
            .unwrap();

        let file = IncomingFile::from_bytes(info("icon", "x.svg", "image/svg+xml"), "<svg></svg>");
        let err = storage.handle_file(&context(), file).await.unwrap_err();
        assert_eq!(err.error_type(), "entity.too.large");
        assert_eq!(err.http_status_code(), 413);
    }

    #[tokio::test]
    async fn test_backend_error_is_returned_unchanged() {
        let mut client = MockS3Client::new();
        client
            .expect_upload()
            .times(1)
            .returning(|_| Err(StorageError::UploadFailed("access denied".to_string())));
        let storage = S3Storage::builder()
            .bucket("uploads")
            .content_type(ContentTypeStrategy::Fixed("text/plain".to_string()))
            .client(Arc::new(client))
            .build()
            .unwrap();

        let file = IncomingFile::from_bytes(info("f", "a.txt", "text/plain"), "x");
        let err = storage.handle_file(&context(), file).await.unwrap_err();
        assert!(matches!(err, StorageError::UploadFailed(ref m) if m == "access denied"));
    }

    #[tokio::test]
    async fn test_stream_limit_error_wins_over_backend_error() {
        let storage = S3Storage::builder()
            .bucket("uploads")
            .content_type(ContentTypeStrategy::Default)
            .client(Arc::new(MockS3::new()))
            .build()
            .unwrap();

        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(
                io::ErrorKind::Other,
                multer::Error::FieldSizeExceeded {
                    limit: 4,
                    field_name: Some("f".to_string()),
                },
            )),
        ];
        let file = IncomingFile::new(
            info("f", "a.bin", "application/octet-stream"),
            stream::iter(chunks).boxed(),
        );
        let err = storage.handle_file(&context(), file).await.unwrap_err();
        assert!(matches!(err, StorageError::PayloadTooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn test_remove_file_deletes_bucket_and_key() {
        let mut client = MockS3Client::new();
        client
            .expect_delete()
            .withf(|bucket, key| bucket == "uploads" && key == "abc")
            .times(1)
            .returning(|_, _| Ok(()));
        let storage = S3Storage::builder()
            .bucket("uploads")
            .client(Arc::new(client))
            .build()
            .unwrap();

        let stored = UploadedFile {
            field_name: "f".to_string(),
            original_name: "a".to_string(),
            encoding: "7bit".to_string(),
            mime_type: "text/plain".to_string(),
            size: 1,
            bucket: "uploads".to_string(),
            key: "abc".to_string(),
            acl: None,
            content_type: "text/plain".to_string(),
            content_disposition: None,
            content_encoding: None,
            storage_class: None,
            metadata: None,
            location: MOCK_LOCATION.to_string(),
            etag: MOCK_ETAG.to_string(),
            version_id: None,
            server_side_encryption: None,
        };
        storage.remove_file(&context(), &stored).await.unwrap();
    }

    #[tokio::test]
    async fn test_progress_listener_is_forwarded() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_in_listener = seen.clone();
        let storage = S3Storage::builder()
            .bucket("uploads")
            .on_progress(move |progress| {
                seen_in_listener.store(progress.loaded, Ordering::SeqCst);
            })
            .client(Arc::new(MockS3::new()))
            .build()
            .unwrap();

        let file = IncomingFile::from_bytes(info("f", "a.txt", "text/plain"), "12345");
        storage.handle_file(&context(), file).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
