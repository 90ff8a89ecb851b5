//! Key generation for `add`.
//!
//! Keys are UUIDv7 values (48-bit millisecond timestamp followed by random
//! bits) rendered in base 58. Later keys from one process sort after
//! earlier ones when their rendered lengths match.

use uuid::Uuid;

/// Digits used for rendering, lowest first. Omits `i`, `u` and their
/// uppercase forms.
pub const CHARSET: &[u8; 58] = b"0123456789abcdefghjklmnopqrstvwxyzABCDEFGHJKLMNOPQRSTVWXYZ";

/// Renders a number in base 58 over [`CHARSET`].
#[must_use]
pub fn base58(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let base = CHARSET.len() as u128;
    let mut digits = Vec::with_capacity(22);
    while n > 0 {
        digits.push(CHARSET[(n % base) as usize]);
        n /= base;
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

/// Generates a fresh key.
#[must_use]
pub fn generate_key() -> String {
    base58(Uuid::now_v7().as_u128())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn small_numbers() {
        assert_eq!(base58(0), "0");
        assert_eq!(base58(9), "9");
        assert_eq!(base58(10), "a");
        assert_eq!(base58(57), "Z");
        assert_eq!(base58(58), "10");
    }

    #[test]
    fn charset_skips_ambiguous_letters() {
        for c in [b'i', b'u', b'I', b'U'] {
            assert!(!CHARSET.contains(&c));
        }
    }

    #[test]
    fn generated_keys_are_unique() {
        let keys: HashSet<String> = (0..1000).map(|_| generate_key()).collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn generated_keys_use_charset() {
        let key = generate_key();
        assert!(key.bytes().all(|b| CHARSET.contains(&b)));
        assert!(key.len() <= 22);
    }
}
