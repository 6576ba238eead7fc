//! Error types module
//!
//! `ConfigError` covers everything that can go wrong while an engine or a backend
//! is being configured. The `ErrorMetadata` trait lets errors describe how they
//! should be reported, and is implemented by the storage crate's errors as well.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like size limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "PAYLOAD_TOO_LARGE")
    fn error_code(&self) -> &'static str;

    /// Dotted error classification (e.g., "entity.too.large")
    fn error_type(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Configuration errors, raised when an engine or backend is built
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required option: {0}")]
    MissingOption(&'static str),

    #[error("Invalid type for option '{option}': {message}")]
    InvalidType { option: String, message: String },

    #[error("Invalid value for option '{option}': {message}")]
    InvalidValue { option: String, message: String },

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("No storage client supplied and no configuration to construct one")]
    MissingClient,
}

impl ConfigError {
    pub(crate) fn invalid_type(option: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidType {
            option: option.to_string(),
            message: message.into(),
        }
    }

    /// Whether this is a shape mismatch rather than a missing or bad value
    pub fn is_type_error(&self) -> bool {
        matches!(self, ConfigError::InvalidType { .. })
    }
}

impl ErrorMetadata for ConfigError {
    fn http_status_code(&self) -> u16 {
        500
    }

    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::InvalidType { .. } => "CONFIG_TYPE_ERROR",
            _ => "CONFIG_ERROR",
        }
    }

    fn error_type(&self) -> &'static str {
        "config.invalid"
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn log_level(&self) -> LogLevel {
        LogLevel::Error
    }
}
