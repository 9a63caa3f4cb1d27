//! Core error types

use thiserror::Error;

/// Errors raised while turning raw manifest bytes into resource documents.
///
/// A decode error is always local: it is returned before any backend is
/// contacted.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Manifest is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Document {index} is not an object")]
    NotAnObject { index: usize },

    #[error("Document {index} is missing required field: {field}")]
    MissingField { index: usize, field: String },

    #[error("Document {index} has an invalid {field}: {message}")]
    InvalidField {
        index: usize,
        field: String,
        message: String,
    },

    #[error("Duplicate resource {identity} in the same batch")]
    DuplicateIdentity { identity: String },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
