//! Value to stored-payload encoding.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Payloads at or below this many bytes are never compressed; below it the
/// compression frame overhead outweighs any savings.
pub const COMPRESSION_THRESHOLD: usize = 39;

/// zstd level used for payload compression.
pub const COMPRESSION_LEVEL: i32 = 3;

/// A value in its stored form, with the flags needed to read it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Raw, JSON, or compressed bytes.
    pub bytes: Vec<u8>,
    /// `bytes` (after decompression) is JSON text.
    pub is_json: bool,
    /// `bytes` is a zstd frame.
    pub is_compressed: bool,
}

impl Payload {
    /// Stored size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the stored form is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encodes a value into its stored form.
///
/// Text is stored as raw UTF-8 with `is_json = false`. Everything else is
/// serialized to JSON. Payloads longer than [`COMPRESSION_THRESHOLD`] bytes
/// are compressed, and the compressed form is kept only when it is strictly
/// smaller.
///
/// # Errors
///
/// Returns an error for non-finite floats or if compression fails.
pub fn encode(value: &Value) -> CodecResult<Payload> {
    let (bytes, is_json) = match value {
        Value::Text(s) => (s.as_bytes().to_vec(), false),
        other => {
            let json = other.to_json()?;
            let text = serde_json::to_vec(&json)
                .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
            (text, true)
        }
    };

    if bytes.len() > COMPRESSION_THRESHOLD {
        let compressed = zstd::encode_all(bytes.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| CodecError::encoding_failed(format!("compression failed: {e}")))?;
        if compressed.len() < bytes.len() {
            return Ok(Payload {
                bytes: compressed,
                is_json,
                is_compressed: true,
            });
        }
    }

    Ok(Payload {
        bytes,
        is_json,
        is_compressed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    #[test]
    fn text_is_raw() {
        let payload = encode(&Value::from("blip")).unwrap();
        assert_eq!(payload.bytes, b"blip");
        assert!(!payload.is_json);
        assert!(!payload.is_compressed);
    }

    #[test]
    fn non_text_is_json() {
        let payload = encode(&Value::from(555)).unwrap();
        assert_eq!(payload.bytes, b"555");
        assert!(payload.is_json);

        let payload = encode(&Value::map([("x", 2)])).unwrap();
        assert_eq!(payload.bytes, br#"{"x":2}"#);
        assert!(payload.is_json);
    }

    #[test]
    fn short_payloads_never_compress() {
        let payload = encode(&Value::from("a".repeat(COMPRESSION_THRESHOLD))).unwrap();
        assert!(!payload.is_compressed);
        assert_eq!(payload.len(), COMPRESSION_THRESHOLD);
    }

    #[test]
    fn repetitive_payloads_compress() {
        let payload = encode(&Value::from("a".repeat(100))).unwrap();
        assert!(payload.is_compressed);
        assert!(payload.len() < 100);
    }

    #[test]
    fn high_entropy_payloads_stay_raw() {
        let noise: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(100)
            .map(char::from)
            .collect();
        let payload = encode(&Value::from(noise)).unwrap();
        assert!(!payload.is_compressed);
        assert_eq!(payload.len(), 100);
    }
}
