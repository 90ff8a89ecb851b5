//! # DataBag Codec
//!
//! Value model and payload framing for DataBag.
//!
//! Every stored value goes through one transformation:
//! - Text is stored as raw UTF-8
//! - Everything else is stored as JSON text
//! - Payloads longer than [`COMPRESSION_THRESHOLD`] bytes are zstd
//!   compressed, but only when that makes them strictly smaller
//!
//! Two flags travel with the bytes (`is_json`, `is_compressed`) so the
//! payload can be read back without guessing.
//!
//! ## Usage
//!
//! ```
//! use databag_codec::{decode, encode, Value};
//!
//! let value = Value::map([("x", 2)]);
//! let payload = encode(&value).unwrap();
//! let decoded = decode(&payload.bytes, payload.is_json, payload.is_compressed).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::decode;
pub use encoder::{encode, Payload, COMPRESSION_LEVEL, COMPRESSION_THRESHOLD};
pub use error::{CodecError, CodecResult};
pub use value::{iso8601, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(value: &Value) -> Value {
        let payload = encode(value).unwrap();
        decode(&payload.bytes, payload.is_json, payload.is_compressed).unwrap()
    }

    #[test]
    fn nested_document() {
        let value = Value::map([
            (
                "users",
                Value::Array(vec![
                    Value::map([("name", Value::from("Alice")), ("age", Value::from(30))]),
                    Value::map([("name", Value::from("Bob")), ("age", Value::from(25))]),
                ]),
            ),
            ("count", Value::from(2)),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn compressed_json_reads_back() {
        let value = Value::Array(vec![Value::from("same"); 50]);
        let payload = encode(&value).unwrap();
        assert!(payload.is_json);
        assert!(payload.is_compressed);
        assert_eq!(roundtrip(&value), value);
    }

    proptest! {
        #[test]
        fn text_survives(s in ".{0,200}") {
            let value = Value::Text(s);
            prop_assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn integers_survive(n in any::<i64>()) {
            let value = Value::Integer(n);
            prop_assert_eq!(roundtrip(&value), value);
        }
    }
}
