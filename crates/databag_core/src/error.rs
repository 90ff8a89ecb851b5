//! Error types for DataBag core.

use databag_codec::CodecError;
use databag_storage::StorageError;
use thiserror::Error;

/// Result type for bag operations.
pub type BagResult<T> = Result<T, BagError>;

/// Errors that can occur in bag operations.
#[derive(Debug, Error)]
pub enum BagError {
    /// No row exists at the requested key and version.
    #[error("key not found: {key:?} at version {version}")]
    NotFound {
        /// The key that was looked up.
        key: String,
        /// The version that was looked up.
        version: i64,
    },

    /// Versions are zero (current) or negative (history).
    #[error("invalid version {0}: version must be 0 or less")]
    InvalidVersion(i64),

    /// A value had the wrong shape for where it was written.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What was expected.
        expected: String,
        /// What was provided.
        found: String,
    },

    /// Unknown symbolic operator in a query map.
    #[error("unsupported query operator: {0}")]
    UnsupportedOperator(String),

    /// A query argument was neither a predicate nor a field map.
    #[error("query arguments must be predicates or maps, found {0}")]
    QueryTypeError(String),

    /// A stored payload could not be decoded.
    #[error("malformed payload: {message}")]
    MalformedPayload {
        /// Description of the decoding failure.
        message: String,
    },

    /// A value could not be encoded for storage.
    #[error("encoding failed: {message}")]
    Encoding {
        /// Description of the encoding failure.
        message: String,
    },

    /// Rejected configuration or name.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The journal contains a structurally invalid record.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A journal record failed its checksum.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Storage backend error, passed through unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl BagError {
    /// Creates a not found error.
    pub fn not_found(key: impl Into<String>, version: i64) -> Self {
        Self::NotFound {
            key: key.into(),
            version,
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Returns true for [`BagError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<CodecError> for BagError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedPayload { message } => Self::MalformedPayload { message },
            CodecError::EncodingFailed { message } => Self::Encoding { message },
            other @ CodecError::NonFiniteFloat(_) => Self::Encoding {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_map_to_bag_errors() {
        let err: BagError = CodecError::malformed("bad json").into();
        assert!(matches!(err, BagError::MalformedPayload { ref message } if message == "bad json"));

        let err: BagError = CodecError::NonFiniteFloat("NaN".into()).into();
        assert!(matches!(err, BagError::Encoding { .. }));
    }

    #[test]
    fn storage_errors_pass_through() {
        let err: BagError = StorageError::Locked {
            path: "/tmp/bag.db".into(),
        }
        .into();
        assert!(matches!(err, BagError::Storage(StorageError::Locked { .. })));
    }

    #[test]
    fn not_found_display() {
        let err = BagError::not_found("blah", -1);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "key not found: \"blah\" at version -1");
    }
}
