//! Multipart form driver
//!
//! Parses a `multipart/form-data` body with `multer`, keeps text fields and hands
//! every accepted file field to a `StorageEngine`. When any step fails, files
//! already stored for the request are removed again before the error is returned.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use http::header::CONTENT_TYPE;
use multer::{Constraints, Multipart, SizeLimit};
use serde::Serialize;

use crate::traits::{StorageEngine, StorageError, StorageResult};
use crate::types::{FileInfo, IncomingFile, RequestContext, UploadedFile};

const DEFAULT_ENCODING: &str = "7bit";
const DEFAULT_PART_TYPE: &str = "application/octet-stream";

/// Which file fields a form may carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelector {
    /// Named fields with a maximum count each
    Fields(Vec<(String, usize)>),
    /// Any file field, any number of times
    Any,
    /// Text fields only
    None,
}

impl FileSelector {
    fn max_count(&self, field: &str) -> Option<usize> {
        match self {
            FileSelector::Fields(fields) => fields
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, max)| *max),
            FileSelector::Any => Some(usize::MAX),
            FileSelector::None => None,
        }
    }
}

/// Text fields and stored files of one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedForm {
    /// Text values by field name, in submission order
    pub fields: HashMap<String, Vec<String>>,
    pub files: Vec<UploadedFile>,
}

impl ParsedForm {
    /// First value of a text field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// First file stored for a field
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|file| file.field_name == name)
    }

    pub fn files_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |file| file.field_name == name)
    }
}

/// Drives a storage engine from multipart request bodies
#[derive(Clone)]
pub struct MultipartUpload {
    storage: Arc<dyn StorageEngine>,
    selector: FileSelector,
    file_size_limit: Option<u64>,
}

impl MultipartUpload {
    pub fn new(storage: Arc<dyn StorageEngine>, selector: FileSelector) -> Self {
        MultipartUpload {
            storage,
            selector,
            file_size_limit: None,
        }
    }

    /// At most one file, in `field`
    pub fn single(storage: Arc<dyn StorageEngine>, field: impl Into<String>) -> Self {
        Self::new(storage, FileSelector::Fields(vec![(field.into(), 1)]))
    }

    /// Up to `max_count` files in `field`
    pub fn array(
        storage: Arc<dyn StorageEngine>,
        field: impl Into<String>,
        max_count: usize,
    ) -> Self {
        Self::new(storage, FileSelector::Fields(vec![(field.into(), max_count)]))
    }

    pub fn fields(storage: Arc<dyn StorageEngine>, fields: &[(&str, usize)]) -> Self {
        let fields = fields
            .iter()
            .map(|(name, max)| (name.to_string(), *max))
            .collect();
        Self::new(storage, FileSelector::Fields(fields))
    }

    pub fn any(storage: Arc<dyn StorageEngine>) -> Self {
        Self::new(storage, FileSelector::Any)
    }

    pub fn none(storage: Arc<dyn StorageEngine>) -> Self {
        Self::new(storage, FileSelector::None)
    }

    /// Maximum size of any single field, in bytes
    pub fn file_size_limit(mut self, limit: u64) -> Self {
        self.file_size_limit = Some(limit);
        self
    }

    /// Parse `body` and store its files
    ///
    /// The boundary is taken from the request's `Content-Type` header.
    pub async fn handle<S, O, E>(
        &self,
        request: &RequestContext,
        body: S,
    ) -> StorageResult<ParsedForm>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let content_type = request
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| StorageError::Multipart("missing Content-Type header".to_string()))?;
        let boundary = multer::parse_boundary(content_type)?;

        let mut constraints = Constraints::new();
        if let Some(limit) = self.file_size_limit {
            constraints = constraints.size_limit(SizeLimit::new().per_field(limit));
        }
        let mut multipart = Multipart::with_constraints(body, boundary, constraints);

        let mut form = ParsedForm::default();
        if let Err(e) = self.read_fields(request, &mut multipart, &mut form).await {
            tracing::debug!(error = %e, stored = form.files.len(), "Multipart upload failed");
            self.remove_stored(request, &form.files).await;
            return Err(e);
        }

        Ok(form)
    }

    async fn read_fields(
        &self,
        request: &RequestContext,
        multipart: &mut Multipart<'static>,
        form: &mut ParsedForm,
    ) -> StorageResult<()> {
        let mut counts: HashMap<String, usize> = HashMap::new();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(original_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                form.fields.entry(name).or_default().push(value);
                continue;
            };

            let count = counts.entry(name.clone()).or_default();
            *count += 1;
            match self.selector.max_count(&name) {
                Some(max) if *count <= max => {}
                _ => return Err(StorageError::UnexpectedField(name)),
            }

            let info = FileInfo {
                field_name: name,
                original_name,
                encoding: field
                    .headers()
                    .get("content-transfer-encoding")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or(DEFAULT_ENCODING)
                    .to_string(),
                mime_type: field
                    .content_type()
                    .map(|mime| mime.to_string())
                    .unwrap_or_else(|| DEFAULT_PART_TYPE.to_string()),
            };

            let stream = field
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
                .boxed();
            let stored = self
                .storage
                .handle_file(request, IncomingFile::new(info, stream))
                .await?;
            form.files.push(stored);
        }

        Ok(())
    }

    async fn remove_stored(&self, request: &RequestContext, files: &[UploadedFile]) {
        for file in files {
            if let Err(e) = self.storage.remove_file(request, file).await {
                tracing::warn!(
                    error = %e,
                    bucket = %file.bucket,
                    key = %file.key,
                    "Failed to remove stored file after upload error"
                );
            }
        }
    }
}
