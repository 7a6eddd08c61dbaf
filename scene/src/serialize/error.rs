//! Error types for field serialization and deserialization.

use std::fmt;

/// Errors that can occur while writing an object's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    /// A field could not be converted to a JSON value.
    FieldError { field: String, message: String },
    /// Encoding error for a whole document.
    FormatError(String),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldError { field, message } => {
                write!(f, "failed to serialize field '{field}': {message}")
            }
            Self::FormatError(msg) => write!(f, "format error: {msg}"),
        }
    }
}

impl std::error::Error for SerializeError {}

/// Errors that can occur while reading an object's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeserializeError {
    /// A required field was missing from the stream.
    MissingField { field: String },
    /// A field value had an unexpected type.
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
    /// Decoding error for a whole document.
    FormatError(String),
}

impl fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing field '{field}'"),
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => {
                write!(
                    f,
                    "type mismatch for field '{field}': expected {expected}, found {found}"
                )
            }
            Self::FormatError(msg) => write!(f, "format error: {msg}"),
        }
    }
}

impl std::error::Error for DeserializeError {}
