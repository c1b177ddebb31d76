//! Text encoding for fixed-length binary values.
//!
//! Ids, public keys and sealed keys are all carried as padded URL-safe
//! base64. A 32-byte value always encodes to exactly 44 characters, which is
//! also a valid file name on every supported platform.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;

use crate::error::{TypeError, TypeResult};

/// Encode arbitrary bytes.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

/// Decode text of any length.
pub fn decode(text: &str) -> TypeResult<Vec<u8>> {
    URL_SAFE
        .decode(text)
        .map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

/// Decode text that must hold exactly `N` bytes.
pub fn decode_array<const N: usize>(text: &str) -> TypeResult<[u8; N]> {
    let bytes = decode(text)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| TypeError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_two_bytes_encode_to_44_chars() {
        assert_eq!(encode(&[0xffu8; 32]).len(), 44);
    }

    #[test]
    fn url_safe_alphabet() {
        let text = encode(&[0xfb, 0xff, 0xfe]);
        assert!(!text.contains('+'));
        assert!(!text.contains('/'));
    }

    #[test]
    fn decode_array_rejects_wrong_length() {
        let err = decode_array::<32>(&encode(&[1u8; 31])).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 31
            }
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode("not base64 at all!"),
            Err(TypeError::InvalidEncoding(_))
        ));
    }
}
