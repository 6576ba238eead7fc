use std::time::Instant;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, ServerSideEncryption, StorageClass,
};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::traits::{S3Client, StorageError, StorageResult};
use crate::types::{FileStream, UploadBody, UploadOutput, UploadParams, UploadRequest};

/// Bodies up to this size are sent with a single PutObject
const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024; // 5MB
/// Minimum part size S3 accepts, except for the last part
const PART_SIZE: usize = 5 * 1024 * 1024;

/// S3 client backed by the AWS SDK
///
/// Uploads are managed: small bodies go out in one request, larger ones as a
/// multipart upload that is aborted if any part fails.
#[derive(Clone)]
pub struct AwsS3Client {
    client: Client,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl AwsS3Client {
    /// Create a client from the default AWS credential chain
    ///
    /// # Arguments
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(region: String, endpoint_url: Option<String>) -> Self {
        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config)
            .load()
            .await;

        let client = if let Some(ref endpoint) = endpoint_url {
            // Path-style addressing is required by MinIO and most S3-compatible providers
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&config)
        };

        Self::from_client(client, region, endpoint_url)
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client, region: String, endpoint_url: Option<String>) -> Self {
        AwsS3Client {
            client,
            region,
            endpoint_url,
        }
    }

    /// Public URL of an object
    ///
    /// For AWS S3: `https://{bucket}.s3.{region}.amazonaws.com/{key}`.
    /// For S3-compatible providers, path-style: `{endpoint}/{bucket}/{key}`.
    fn generate_url(&self, bucket: &str, key: &str) -> String {
        let key = encode_key(key);
        if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, bucket, key)
        } else {
            format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region, key)
        }
    }

    async fn put_object(&self, params: &UploadParams, data: Bytes) -> StorageResult<UploadOutput> {
        let size = data.len() as u64;

        let output = self
            .client
            .put_object()
            .bucket(&params.bucket)
            .key(&params.key)
            .body(ByteStream::from(data))
            .content_type(&params.content_type)
            .set_acl(params.acl.as_deref().map(ObjectCannedAcl::from))
            .set_server_side_encryption(
                params
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .set_ssekms_key_id(params.sse_kms_key_id.clone())
            .set_storage_class(params.storage_class.as_deref().map(StorageClass::from))
            .set_cache_control(params.cache_control.clone())
            .set_content_disposition(params.content_disposition.clone())
            .set_content_encoding(params.content_encoding.clone())
            .set_metadata(params.metadata.clone())
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        params.report_progress(size, Some(size));

        Ok(UploadOutput {
            location: self.generate_url(&params.bucket, &params.key),
            etag: output.e_tag().unwrap_or_default().to_string(),
            version_id: output.version_id().map(String::from),
        })
    }

    async fn multipart_upload(
        &self,
        params: &UploadParams,
        stream: FileStream,
        buffer: BytesMut,
        exhausted: bool,
    ) -> StorageResult<UploadOutput> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&params.bucket)
            .key(&params.key)
            .content_type(&params.content_type)
            .set_acl(params.acl.as_deref().map(ObjectCannedAcl::from))
            .set_server_side_encryption(
                params
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .set_ssekms_key_id(params.sse_kms_key_id.clone())
            .set_storage_class(params.storage_class.as_deref().map(StorageClass::from))
            .set_cache_control(params.cache_control.clone())
            .set_content_disposition(params.content_disposition.clone())
            .set_content_encoding(params.content_encoding.clone())
            .set_metadata(params.metadata.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %params.bucket,
                    key = %params.key,
                    "Failed to create multipart upload"
                );
                StorageError::UploadFailed(DisplayErrorContext(&e).to_string())
            })?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::UploadFailed("No upload ID returned from S3".to_string()))?
            .to_string();

        let parts = match self
            .upload_parts(params, &upload_id, stream, buffer, exhausted)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                self.abort(params, &upload_id).await;
                return Err(e);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&params.bucket)
            .key(&params.key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;

        let output = match completed {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %params.bucket,
                    key = %params.key,
                    "Failed to complete multipart upload"
                );
                self.abort(params, &upload_id).await;
                return Err(StorageError::UploadFailed(DisplayErrorContext(&e).to_string()));
            }
        };

        Ok(UploadOutput {
            location: self.generate_url(&params.bucket, &params.key),
            etag: output.e_tag().unwrap_or_default().to_string(),
            version_id: output.version_id().map(String::from),
        })
    }

    async fn upload_parts(
        &self,
        params: &UploadParams,
        upload_id: &str,
        mut stream: FileStream,
        mut buffer: BytesMut,
        mut exhausted: bool,
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut loaded = 0u64;

        loop {
            if !exhausted {
                exhausted = fill(&mut stream, &mut buffer, PART_SIZE).await?;
            }
            if buffer.is_empty() {
                break;
            }

            let take = buffer.len().min(PART_SIZE);
            let part = buffer.split_to(take).freeze();
            let part_len = part.len() as u64;

            let uploaded = self
                .client
                .upload_part()
                .bucket(&params.bucket)
                .key(&params.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %DisplayErrorContext(&e),
                        bucket = %params.bucket,
                        key = %params.key,
                        part_number = part_number,
                        "Failed to upload part"
                    );
                    StorageError::UploadFailed(DisplayErrorContext(&e).to_string())
                })?;

            let etag = uploaded.e_tag().ok_or_else(|| {
                StorageError::UploadFailed(format!("No ETag returned for part {}", part_number))
            })?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );

            loaded += part_len;
            params.report_progress(loaded, exhausted.then_some(loaded + buffer.len() as u64));

            if exhausted && buffer.is_empty() {
                break;
            }
            part_number += 1;
        }

        Ok(parts)
    }

    async fn send(&self, params: &UploadParams, body: UploadBody) -> StorageResult<UploadOutput> {
        let mut stream = match body {
            UploadBody::Bytes(data) if data.len() <= MULTIPART_THRESHOLD => {
                return self.put_object(params, data).await;
            }
            body => body.into_stream(),
        };
        let mut buffer = BytesMut::new();
        let exhausted = fill(&mut stream, &mut buffer, MULTIPART_THRESHOLD + 1).await?;
        if exhausted && buffer.len() <= MULTIPART_THRESHOLD {
            self.put_object(params, buffer.freeze()).await
        } else {
            self.multipart_upload(params, stream, buffer, exhausted)
                .await
        }
    }

    async fn abort(&self, params: &UploadParams, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&params.bucket)
            .key(&params.key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(
                error = %DisplayErrorContext(&e),
                bucket = %params.bucket,
                key = %params.key,
                upload_id = %upload_id,
                "Failed to abort multipart upload"
            );
        }
    }
}

#[async_trait]
impl S3Client for AwsS3Client {
    async fn upload(&self, request: UploadRequest) -> StorageResult<UploadOutput> {
        let start = Instant::now();
        let UploadRequest { params, body } = request;

        match self.send(&params, body).await {
            Ok(output) => {
                tracing::info!(
                    bucket = %params.bucket,
                    key = %params.key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload successful"
                );
                Ok(output)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %params.bucket,
                    key = %params.key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                Err(e)
            }
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let start = Instant::now();

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                StorageError::DeleteFailed(DisplayErrorContext(&e).to_string())
            })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }
}

/// Read from `stream` until `buffer` holds at least `target` bytes
///
/// Returns `true` once the stream is exhausted.
async fn fill(stream: &mut FileStream, buffer: &mut BytesMut, target: usize) -> StorageResult<bool> {
    while buffer.len() < target {
        match stream.next().await {
            Some(chunk) => buffer.extend_from_slice(&chunk.map_err(StorageError::from_stream_error)?),
            None => return Ok(true),
        }
    }
    Ok(false)
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
