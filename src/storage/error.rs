//! Storage engine error types
//!
//! Defines all errors that can occur in the storage layer.

use thiserror::Error;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A fixed-size or length-prefixed read ran past the end of the input
    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    /// File header names a different file type than the caller expected
    #[error("Invalid file type: expected {expected}, found {found}")]
    InvalidFileType { expected: u8, found: u8 },

    /// Bad magic bytes or unsupported format version
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Varint does not fit in 64 bits
    #[error("Varint overflows 64 bits")]
    Overflow,

    /// Codec-specific encode/decode failure
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Segment operation attempted outside its lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Ingested event has no value for a declared field
    #[error("Missing value for field: {0}")]
    MissingField(String),

    /// Ingested value does not match the declared field type
    #[error("Type mismatch for field {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Data corruption detected (checksum mismatch, bad offsets, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the error describes bad data or I/O rather than a caller bug.
    ///
    /// Lifecycle violations mean the caller drove a segment through an illegal
    /// transition; retrying or skipping cannot fix that.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StorageError::InvalidState(_))
    }

    pub(crate) fn truncated(needed: usize, remaining: usize) -> Self {
        StorageError::TruncatedInput { needed, remaining }
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::MissingField("host".to_string());
        assert_eq!(err.to_string(), "Missing value for field: host");

        let err = StorageError::TruncatedInput {
            needed: 8,
            remaining: 3,
        };
        assert_eq!(
            err.to_string(),
            "Truncated input: needed 8 bytes, 3 remaining"
        );

        let err = StorageError::InvalidFileType {
            expected: 2,
            found: 0,
        };
        assert_eq!(err.to_string(), "Invalid file type: expected 2, found 0");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }

    #[test]
    fn test_recoverability() {
        assert!(!StorageError::InvalidState("closed".into()).is_recoverable());
        assert!(StorageError::Overflow.is_recoverable());
        assert!(StorageError::Corruption("crc".into()).is_recoverable());
    }
}
