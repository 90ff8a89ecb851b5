//! Stored-payload to value decoding.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Decodes a stored payload.
///
/// Decompresses first when `is_compressed` is set, then parses JSON when
/// `is_json` is set, otherwise returns the bytes as text.
///
/// Timestamps were written as RFC 3339 strings and come back as
/// [`Value::Text`]; the date type is not reconstructed.
///
/// # Errors
///
/// Returns [`CodecError::MalformedPayload`] if decompression, UTF-8
/// validation or JSON parsing fails.
pub fn decode(bytes: &[u8], is_json: bool, is_compressed: bool) -> CodecResult<Value> {
    let inflated;
    let raw = if is_compressed {
        inflated = zstd::decode_all(bytes)
            .map_err(|e| CodecError::malformed(format!("decompression failed: {e}")))?;
        inflated.as_slice()
    } else {
        bytes
    };

    if is_json {
        let json: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|e| CodecError::malformed(format!("invalid JSON: {e}")))?;
        return Ok(Value::from_json(json));
    }

    let text = std::str::from_utf8(raw)
        .map_err(|e| CodecError::malformed(format!("invalid UTF-8: {e}")))?;
    Ok(Value::Text(text.to_string()))
}
