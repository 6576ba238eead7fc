//! End-to-end uploads through `object_store` backends.
//!
//! Run with: `cargo test -p s3form-storage --test store_test`

#![cfg(feature = "storage-object-store")]

mod helpers;

use std::sync::Arc;

use helpers::fixtures::{self, PNG_SIZE, SANITIZED_SVG_SIZE};
use helpers::{chunked, init_tracing, multipart_body, multipart_request, Part};
use s3form_storage::{
    MultipartUpload, ObjectStoreClient, S3Client, S3Storage, StorageEngine, StorageError,
};

fn engine(client: Arc<ObjectStoreClient>) -> S3Storage {
    S3Storage::builder()
        .bucket(client.bucket().to_string())
        .key_with(|_, file| Ok(format!("uploads/{}", file.original_name)))
        .cache_control("max-age=60")
        .client(client)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_memory_upload_read_and_remove() {
    init_tracing();
    let client = Arc::new(ObjectStoreClient::in_memory("media"));
    let storage = Arc::new(engine(client.clone()));
    let png = fixtures::white_png();

    let upload = MultipartUpload::any(storage.clone());
    let form = upload
        .handle(
            &multipart_request(),
            chunked(
                multipart_body(&[Part::File {
                    name: "image",
                    file_name: "ffffff.png",
                    content_type: None,
                    data: &png,
                }]),
                7,
            ),
        )
        .await
        .unwrap();

    let file = form.file("image").unwrap();
    assert_eq!(file.size, PNG_SIZE);
    assert_eq!(file.mime_type, "application/octet-stream");
    assert_eq!(file.content_type, "image/png");
    assert_eq!(file.location, "memory://media/uploads/ffffff.png");
    assert_eq!(&client.get("uploads/ffffff.png").await.unwrap()[..], &png[..]);

    storage
        .remove_file(&multipart_request(), file)
        .await
        .unwrap();
    assert!(client.get("uploads/ffffff.png").await.is_err());
}

#[tokio::test]
async fn test_local_directory_upload() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(
        ObjectStoreClient::local(
            "media",
            dir.path(),
            Some("http://localhost:3000/media".to_string()),
        )
        .unwrap(),
    );
    let svg = fixtures::xss_svg();

    let upload = MultipartUpload::single(Arc::new(engine(client)), "logo");
    let form = upload
        .handle(
            &multipart_request(),
            chunked(
                multipart_body(&[Part::File {
                    name: "logo",
                    file_name: "xss-test.svg",
                    content_type: Some("image/svg+xml"),
                    data: &svg,
                }]),
                128,
            ),
        )
        .await
        .unwrap();

    let file = form.file("logo").unwrap();
    assert_eq!(file.size, SANITIZED_SVG_SIZE);
    assert_eq!(file.location, "http://localhost:3000/media/uploads/xss-test.svg");

    let stored = std::fs::read(dir.path().join("uploads").join("xss-test.svg")).unwrap();
    assert_eq!(stored.len() as u64, SANITIZED_SVG_SIZE);
    assert!(!String::from_utf8_lossy(&stored).contains("<script"));
}

#[tokio::test]
async fn test_client_rejects_other_bucket() {
    let client = ObjectStoreClient::in_memory("media");
    let request = s3form_storage::UploadRequest::new(
        "other",
        "a.txt",
        s3form_storage::UploadBody::Bytes(bytes::Bytes::from_static(b"a")),
    );

    let err = client.upload(request).await.unwrap_err();

    assert!(matches!(err, StorageError::BackendError(_)));
}
