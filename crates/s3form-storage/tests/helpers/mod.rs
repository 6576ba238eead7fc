//! Test helpers: multipart bodies, request contexts and engines backed by `MockS3`.
//!
//! Run from workspace root: `cargo test -p s3form-storage`.

pub mod fixtures;

use std::convert::Infallible;
use std::sync::{Arc, Once};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use s3form_storage::{MockS3, MultipartUpload, RequestContext, S3Storage, S3StorageBuilder};

pub const BOUNDARY: &str = "----s3form-test-boundary";

static TRACING: Once = Once::new();

/// Route engine logs to the test writer; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One part of a multipart body.
pub enum Part<'a> {
    Text {
        name: &'a str,
        value: &'a str,
    },
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: Option<&'a str>,
        data: &'a [u8],
    },
}

/// Encode parts as a `multipart/form-data` body delimited by `BOUNDARY`.
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
                    )
                    .as_bytes(),
                );
                if let Some(content_type) = content_type {
                    body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Split a body into chunks of `chunk_size` bytes, as a network read would.
pub fn chunked(body: Vec<u8>, chunk_size: usize) -> BoxStream<'static, Result<Bytes, Infallible>> {
    let body = Bytes::from(body);
    let chunks: Vec<Result<Bytes, Infallible>> = (0..body.len())
        .step_by(chunk_size)
        .map(|start| Ok(body.slice(start..(start + chunk_size).min(body.len()))))
        .collect();
    stream::iter(chunks).boxed()
}

/// Request parts carrying a multipart `Content-Type` with `BOUNDARY`.
pub fn multipart_request() -> RequestContext {
    http::Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(())
        .expect("valid request")
        .into_parts()
        .0
}

/// A builder for the `test-bucket` bucket backed by the given mock.
pub fn storage_builder(mock: &Arc<MockS3>) -> S3StorageBuilder {
    S3Storage::builder().bucket("test-bucket").client(mock.clone())
}

/// Store the parts through a single-file driver on field `image`.
pub async fn upload_image(
    storage: S3Storage,
    parts: &[Part<'_>],
) -> s3form_storage::StorageResult<s3form_storage::ParsedForm> {
    init_tracing();
    let upload = MultipartUpload::single(Arc::new(storage), "image");
    upload
        .handle(&multipart_request(), chunked(multipart_body(parts), 64))
        .await
}
