//! Per-file option resolution
//!
//! Every engine option is either a fixed value or a strategy computed from the
//! request and the file being stored.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use s3form_core::{ContentTypeSetting, KeyStrategy};

use crate::content_type::DEFAULT_CONTENT_TYPE;
use crate::keys;
use crate::traits::StorageResult;
use crate::types::{FileInfo, RequestContext};

/// Computes an option value for one file
pub type Strategy<T> = Arc<dyn Fn(&RequestContext, &FileInfo) -> StorageResult<T> + Send + Sync>;

pub type KeyFn = Strategy<String>;
pub type MetadataFn = Strategy<HashMap<String, String>>;

/// Box a closure as a strategy
pub fn strategy<T, F>(f: F) -> Strategy<T>
where
    F: Fn(&RequestContext, &FileInfo) -> StorageResult<T> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A fixed option value or a strategy producing one
#[derive(Clone)]
pub enum Setting<T> {
    Value(T),
    Dynamic(Strategy<T>),
}

impl<T: Clone> Setting<T> {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&RequestContext, &FileInfo) -> StorageResult<T> + Send + Sync + 'static,
    {
        Setting::Dynamic(strategy(f))
    }

    pub fn resolve(&self, request: &RequestContext, file: &FileInfo) -> StorageResult<T> {
        match self {
            Setting::Value(value) => Ok(value.clone()),
            Setting::Dynamic(strategy) => strategy(request, file),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Setting::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

impl From<&str> for Setting<String> {
    fn from(value: &str) -> Self {
        Setting::Value(value.to_string())
    }
}

impl From<String> for Setting<String> {
    fn from(value: String) -> Self {
        Setting::Value(value)
    }
}

/// How the stored content type is chosen
#[derive(Clone, Default)]
pub enum ContentTypeStrategy {
    /// Detect from the first bytes of the file
    #[default]
    Auto,
    /// Always `application/octet-stream`
    Default,
    Fixed(String),
    Custom(Strategy<String>),
}

impl ContentTypeStrategy {
    /// The content type known without reading the file, if any
    pub fn resolve_static(
        &self,
        request: &RequestContext,
        file: &FileInfo,
    ) -> StorageResult<Option<String>> {
        match self {
            ContentTypeStrategy::Auto => Ok(None),
            ContentTypeStrategy::Default => Ok(Some(DEFAULT_CONTENT_TYPE.to_string())),
            ContentTypeStrategy::Fixed(value) => Ok(Some(value.clone())),
            ContentTypeStrategy::Custom(strategy) => strategy(request, file).map(Some),
        }
    }
}

impl fmt::Debug for ContentTypeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentTypeStrategy::Auto => f.write_str("Auto"),
            ContentTypeStrategy::Default => f.write_str("Default"),
            ContentTypeStrategy::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            ContentTypeStrategy::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl From<ContentTypeSetting> for ContentTypeStrategy {
    fn from(setting: ContentTypeSetting) -> Self {
        match setting {
            ContentTypeSetting::Auto => ContentTypeStrategy::Auto,
            ContentTypeSetting::Default => ContentTypeStrategy::Default,
            ContentTypeSetting::Fixed(value) => ContentTypeStrategy::Fixed(value),
        }
    }
}

/// Turn a declarative key strategy into a key function
pub fn key_fn(key: KeyStrategy) -> KeyFn {
    match key {
        KeyStrategy::Random => strategy(|_, _| Ok(keys::random_key())),
        KeyStrategy::OriginalName => {
            strategy(|_, file| Ok(keys::original_name_key(&file.original_name)))
        }
        KeyStrategy::Prefixed { prefix } => strategy(move |_, _| Ok(keys::prefixed_key(&prefix))),
    }
}
