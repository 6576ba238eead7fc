#[cfg(feature = "storage-s3")]
use crate::s3::AwsS3Client;
#[cfg(feature = "storage-object-store")]
use crate::store::ObjectStoreClient;
use crate::engine::{S3Storage, S3StorageBuilder};
#[cfg(not(feature = "storage-object-store"))]
use crate::StorageError;
use crate::{S3Client, StorageBackend, StorageResult};
use s3form_core::{ConfigError, StorageConfig};
use std::sync::Arc;

/// Create the S3 client selected by configuration
pub async fn create_client(config: &StorageConfig) -> StorageResult<Arc<dyn S3Client>> {
    config.validate()?;

    match config.backend {
        StorageBackend::S3 => {
            let region = config
                .region
                .clone()
                .ok_or(ConfigError::MissingOption("region"))?;
            create_s3_client(config, region).await
        }

        #[cfg(feature = "storage-object-store")]
        StorageBackend::Local => {
            let bucket = config.bucket.clone().unwrap_or_default();
            let path = config
                .local_storage_path
                .clone()
                .ok_or(ConfigError::MissingOption("local_storage_path"))?;
            let client =
                ObjectStoreClient::local(bucket, path, config.local_storage_base_url.clone())?;
            Ok(Arc::new(client))
        }

        #[cfg(feature = "storage-object-store")]
        StorageBackend::Memory => {
            let bucket = config.bucket.clone().unwrap_or_default();
            Ok(Arc::new(ObjectStoreClient::in_memory(bucket)))
        }

        #[cfg(not(feature = "storage-object-store"))]
        StorageBackend::Local | StorageBackend::Memory => Err(StorageError::Config(
            ConfigError::InvalidValue {
                option: "STORAGE_BACKEND".to_string(),
                message: format!(
                    "{} backend not available (storage-object-store feature not enabled)",
                    config.backend
                ),
            },
        )),
    }
}

#[cfg(feature = "storage-s3")]
async fn create_s3_client(
    config: &StorageConfig,
    region: String,
) -> StorageResult<Arc<dyn S3Client>> {
    let client = AwsS3Client::new(region, config.endpoint.clone()).await;
    Ok(Arc::new(client))
}

#[cfg(all(not(feature = "storage-s3"), feature = "storage-object-store"))]
async fn create_s3_client(
    config: &StorageConfig,
    region: String,
) -> StorageResult<Arc<dyn S3Client>> {
    let bucket = config.bucket.clone().unwrap_or_default();
    let client = ObjectStoreClient::s3(bucket, region, config.endpoint.clone())?;
    Ok(Arc::new(client))
}

#[cfg(not(any(feature = "storage-s3", feature = "storage-object-store")))]
async fn create_s3_client(
    _config: &StorageConfig,
    _region: String,
) -> StorageResult<Arc<dyn S3Client>> {
    Err(StorageError::Config(ConfigError::InvalidValue {
        option: "STORAGE_BACKEND".to_string(),
        message: "S3 backend not available (storage-s3 feature not enabled)".to_string(),
    }))
}

/// Create a storage engine with the client and options carried by configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<S3Storage> {
    let client = create_client(config).await?;
    let storage = S3StorageBuilder::from_settings(config.settings())
        .client(client)
        .build()?;

    tracing::info!(
        backend = %config.backend,
        bucket = config.bucket.as_deref().unwrap_or_default(),
        "Storage engine created"
    );

    Ok(storage)
}
