//! Request, response and descriptor types shared by the engine and its backends

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;

/// Head of the HTTP request an upload belongs to
///
/// Strategies receive it to derive buckets, keys or metadata from headers,
/// the URI or extensions set by earlier middleware.
pub type RequestContext = http::request::Parts;

/// Byte stream of one file field
pub type FileStream = BoxStream<'static, io::Result<Bytes>>;

/// Progress listener attached to an upload request
pub type ProgressListener = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// What the multipart parser knows about a file field before reading it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// Form field name
    pub field_name: String,
    /// Filename sent by the client
    pub original_name: String,
    /// Content-Transfer-Encoding of the part, `7bit` when absent
    pub encoding: String,
    /// Content type declared by the client for the part
    pub mime_type: String,
}

/// A file field handed to a storage engine
pub struct IncomingFile {
    pub info: FileInfo,
    pub stream: FileStream,
}

impl IncomingFile {
    pub fn new(info: FileInfo, stream: FileStream) -> Self {
        Self { info, stream }
    }

    /// Build an incoming file from bytes already in memory
    pub fn from_bytes(info: FileInfo, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(info, stream::once(async move { Ok(data) }).boxed())
    }
}

impl fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingFile")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Body of an upload request
pub enum UploadBody {
    /// Fully materialized content, e.g. a sanitized SVG
    Bytes(Bytes),
    /// Content still streaming from the client
    Stream(FileStream),
}

impl UploadBody {
    /// Read the whole body into memory
    pub async fn collect(self) -> io::Result<Bytes> {
        match self {
            UploadBody::Bytes(bytes) => Ok(bytes),
            UploadBody::Stream(stream) => {
                let buffer = stream
                    .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                        buffer.extend_from_slice(&chunk);
                        Ok(buffer)
                    })
                    .await?;
                Ok(buffer.freeze())
            }
        }
    }

    pub fn into_stream(self) -> FileStream {
        match self {
            UploadBody::Bytes(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            UploadBody::Stream(stream) => stream,
        }
    }

    /// Length, when known without reading the stream
    pub fn known_length(&self) -> Option<u64> {
        match self {
            UploadBody::Bytes(bytes) => Some(bytes.len() as u64),
            UploadBody::Stream(_) => None,
        }
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            UploadBody::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// Upload progress as reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes sent so far
    pub loaded: u64,
    /// Total bytes, once known
    pub total: Option<u64>,
}

/// Where and how an object is written
///
/// Everything about an upload except its body, so backends can borrow it
/// while they consume the body.
pub struct UploadParams {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub acl: Option<String>,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
    pub storage_class: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    pub progress: Option<ProgressListener>,
}

impl UploadParams {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            content_type: crate::content_type::DEFAULT_CONTENT_TYPE.to_string(),
            acl: None,
            server_side_encryption: None,
            sse_kms_key_id: None,
            storage_class: None,
            cache_control: None,
            content_disposition: None,
            content_encoding: None,
            metadata: None,
            progress: None,
        }
    }

    /// Notify the progress listener, if any
    pub fn report_progress(&self, loaded: u64, total: Option<u64>) {
        if let Some(ref listener) = self.progress {
            listener(UploadProgress { loaded, total });
        }
    }
}

impl fmt::Debug for UploadParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadParams")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("content_type", &self.content_type)
            .field("acl", &self.acl)
            .field("server_side_encryption", &self.server_side_encryption)
            .field("storage_class", &self.storage_class)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// One object upload, built fresh for every file field
#[derive(Debug)]
pub struct UploadRequest {
    pub params: UploadParams,
    pub body: UploadBody,
}

impl UploadRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: UploadBody) -> Self {
        Self {
            params: UploadParams::new(bucket, key),
            body,
        }
    }
}

/// What a backend reports once an upload completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutput {
    pub location: String,
    pub etag: String,
    pub version_id: Option<String>,
}

/// A file that has been stored in the backend
///
/// Combines the multipart field information with what was sent to and
/// returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub field_name: String,
    pub original_name: String,
    pub encoding: String,
    pub mime_type: String,
    /// Bytes sent to the backend (after sanitization, when it applied)
    pub size: u64,
    pub bucket: String,
    pub key: String,
    pub acl: Option<String>,
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub storage_class: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    pub location: String,
    pub etag: String,
    pub version_id: Option<String>,
    /// Present only when encryption was configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_side_encryption: Option<String>,
}
