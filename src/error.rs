//! Error types for the recliner mapper.

use thiserror::Error;

/// All possible errors from the mapper.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Validation errors
    #[error("no property named '{0}' exists")]
    UnknownProperty(String),

    #[error("missing required property: {0}")]
    MissingRequiredProperty(String),

    #[error("type mismatch for property '{property}': expected {expected}, got {got}")]
    TypeMismatch {
        property: String,
        expected: String,
        got: String,
    },

    #[error("length of '{property}' out of range: {length}")]
    LengthOutOfRange { property: String, length: usize },

    #[error("value of '{property}' out of range")]
    ValueOutOfRange { property: String },

    #[error("duplicate property name: {0}")]
    DuplicateProperty(String),

    #[error("duplicate class: {0}")]
    DuplicateClass(String),

    #[error("linked class '{0}' is not a document class")]
    NotADocumentClass(String),

    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("'{0}' is not a link property")]
    NotALinkProperty(String),

    #[error("document is not bound to a class: {0}")]
    UnboundDocument(String),

    // Store errors
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("revision conflict on document: {0}")]
    Conflict(String),

    #[error("store error (status {status}): {body}")]
    Store { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result type for mapper operations.
pub type Result<T> = std::result::Result<T, Error>;
