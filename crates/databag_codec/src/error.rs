//! Codec failures.

use thiserror::Error;

/// Shorthand for codec results.
pub type CodecResult<T> = Result<T, CodecError>;

/// Why a value could not be turned into a payload, or back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// JSON serialization or compression of a value failed.
    #[error("cannot encode value: {message}")]
    EncodingFailed {
        /// What went wrong.
        message: String,
    },

    /// Stored bytes did not inflate to UTF-8 JSON.
    #[error("stored payload is unreadable: {message}")]
    MalformedPayload {
        /// What went wrong.
        message: String,
    },

    /// A float with no JSON form (NaN or an infinity).
    #[error("float {0} has no JSON form")]
    NonFiniteFloat(String),
}

impl CodecError {
    pub(crate) fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Builds a [`CodecError::MalformedPayload`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_detail() {
        assert_eq!(
            CodecError::malformed("invalid JSON: eof").to_string(),
            "stored payload is unreadable: invalid JSON: eof"
        );
        assert_eq!(
            CodecError::NonFiniteFloat("inf".into()).to_string(),
            "float inf has no JSON form"
        );
    }
}
