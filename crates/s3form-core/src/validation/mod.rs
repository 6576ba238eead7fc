//! Validation modules

pub mod metadata;

pub use metadata::{
    metadata_size, validate_metadata_key, validate_metadata_value, validate_user_metadata,
    MetadataError, MAX_METADATA_SIZE,
};
