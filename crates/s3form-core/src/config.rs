//! Configuration module
//!
//! `StorageConfig` describes how to reach a backend and is read from the environment.
//! `StorageSettings` is the declarative form of the storage engine options; it is
//! what a config file or an environment can express, as opposed to closures.

use std::collections::HashMap;
use std::env;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::storage_types::StorageBackend;

/// How object keys are generated when no key closure is given
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// 32 random hex characters
    #[default]
    Random,
    /// The uploaded file's original name, sanitized
    OriginalName,
    /// A fixed prefix followed by 32 random hex characters
    Prefixed { prefix: String },
}

/// How the stored content type is chosen when no closure is given
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTypeSetting {
    /// Sniff the first bytes of the stream
    #[default]
    Auto,
    /// Always `application/octet-stream`
    Default,
    /// Always the given MIME type
    Fixed(String),
}

/// Declarative storage engine options
///
/// Every field is optional here; required ones are enforced when the engine is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    pub bucket: Option<String>,
    pub key: Option<KeyStrategy>,
    pub content_type: Option<ContentTypeSetting>,
    pub acl: Option<String>,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
    pub storage_class: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    pub svg_file_size_limit: Option<u64>,
}

impl StorageSettings {
    pub const OPTIONS: &'static [&'static str] = &[
        "bucket",
        "key",
        "content_type",
        "acl",
        "server_side_encryption",
        "sse_kms_key_id",
        "storage_class",
        "cache_control",
        "content_disposition",
        "content_encoding",
        "metadata",
        "svg_file_size_limit",
    ];

    /// Parse settings from a JSON object, checking the shape of every option
    ///
    /// A value of the wrong type fails with `ConfigError::InvalidType` naming the
    /// option; `null` counts as unset; unrecognized options are rejected.
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::invalid_type("settings", "expected a JSON object"))?;

        for (name, raw) in object {
            if !Self::OPTIONS.contains(&name.as_str()) {
                return Err(ConfigError::UnknownOption(name.clone()));
            }
            let mut single = Map::new();
            single.insert(name.clone(), raw.clone());
            Self::deserialize(Value::Object(single))
                .map_err(|e| ConfigError::invalid_type(name, e.to_string()))?;
        }

        Self::deserialize(value).map_err(|e| ConfigError::invalid_type("settings", e.to_string()))
    }
}

/// Backend connection configuration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub acl: Option<String>,
    pub server_side_encryption: Option<String>,
    pub sse_kms_key_id: Option<String>,
    pub storage_class: Option<String>,
    pub svg_file_size_limit: Option<u64>,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::default(),
        };

        let svg_file_size_limit = lookup("SVG_FILE_SIZE_LIMIT")
            .map(|value| {
                value.trim().parse::<u64>().map_err(|_| {
                    ConfigError::invalid_type(
                        "SVG_FILE_SIZE_LIMIT",
                        format!("expected a byte count, got '{}'", value),
                    )
                })
            })
            .transpose()?;

        Ok(StorageConfig {
            backend,
            bucket: lookup("S3_BUCKET"),
            region: lookup("S3_REGION").or_else(|| lookup("AWS_REGION")),
            endpoint: lookup("S3_ENDPOINT"),
            local_storage_path: lookup("LOCAL_STORAGE_PATH"),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL"),
            acl: lookup("S3_ACL"),
            server_side_encryption: lookup("S3_SERVER_SIDE_ENCRYPTION"),
            sse_kms_key_id: lookup("S3_SSE_KMS_KEY_ID"),
            storage_class: lookup("S3_STORAGE_CLASS"),
            svg_file_size_limit,
        })
    }

    /// Check that the selected backend has what it needs to be constructed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingOption("bucket"));
        }

        match self.backend {
            StorageBackend::S3 => {
                if self.region.is_none() {
                    return Err(ConfigError::MissingOption("region"));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(ConfigError::MissingOption("local_storage_path"));
                }
            }
            StorageBackend::Memory => {}
        }

        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    option: "endpoint".to_string(),
                    message: format!("'{}' is not an http(s) URL", endpoint),
                });
            }
        }

        Ok(())
    }

    /// Engine options carried by this configuration
    pub fn settings(&self) -> StorageSettings {
        StorageSettings {
            bucket: self.bucket.clone(),
            acl: self.acl.clone(),
            server_side_encryption: self.server_side_encryption.clone(),
            sse_kms_key_id: self.sse_kms_key_id.clone(),
            storage_class: self.storage_class.clone(),
            svg_file_size_limit: self.svg_file_size_limit,
            ..StorageSettings::default()
        }
    }
}
