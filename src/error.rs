//! Error types for the segdex storage engine.

use crate::document::ValueType;
use std::io;

/// The result type used throughout segdex.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for segdex operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred in the underlying byte store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A field was declared with a type that conflicts with an earlier document.
    #[error("Schema conflict on field '{field}': declared as {existing}, got {attempted}")]
    SchemaConflict {
        /// Name of the conflicting field.
        field: String,
        /// The type already recorded in the schema.
        existing: ValueType,
        /// The type the rejected document tried to use.
        attempted: ValueType,
    },

    /// The requested field does not exist in the segment.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// A local ordinal or global document id is outside the valid range.
    #[error("Ordinal {ordinal} out of range (max_doc = {max_doc})")]
    OrdinalOutOfRange {
        /// The rejected ordinal.
        ordinal: u64,
        /// The exclusive upper bound that applied.
        max_doc: u64,
    },

    /// The addressed document exists but has been deleted.
    #[error("Document {ordinal} in segment {generation} is deleted")]
    DocumentDeleted {
        /// Generation of the segment holding the document.
        generation: u64,
        /// Local ordinal of the document.
        ordinal: u32,
    },

    /// A merge had no live documents left to write.
    #[error("Merge aborted: {0}")]
    MergeAborted(String),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The expected checksum value.
        expected: u32,
        /// The actual checksum value.
        actual: u32,
    },

    /// The requested file or index was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The index already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Creates a new out-of-range error.
    pub fn out_of_range(ordinal: impl Into<u64>, max_doc: impl Into<u64>) -> Self {
        Error::OrdinalOutOfRange { ordinal: ordinal.into(), max_doc: max_doc.into() }
    }

    /// Returns true if this error came from the byte store.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
