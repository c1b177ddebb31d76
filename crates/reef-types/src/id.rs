use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512_256};

use crate::error::{TypeError, TypeResult};
use crate::text;

/// Byte length of an [`Id`].
pub const ID_LEN: usize = 32;

/// Character length of an [`Id`] in its canonical text form.
pub const ID_TEXT_LEN: usize = 44;

/// Content identifier addressing a stored blob.
///
/// An `Id` is exactly 32 opaque bytes. Its canonical text form is padded
/// URL-safe base64 (always 44 characters), which doubles as the blob's file
/// name inside a store. Any other byte length is rejected at construction;
/// nothing is truncated or padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id([u8; ID_LEN]);

impl Id {
    /// Derive an `Id` from content bytes (SHA-512/256).
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha512_256::digest(data);
        let mut bytes = [0u8; ID_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// A random id, for tests and scratch objects.
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Create from exactly 32 bytes.
    pub const fn from_array(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> TypeResult<Self> {
        let arr = <[u8; ID_LEN]>::try_from(bytes).map_err(|_| TypeError::InvalidLength {
            expected: ID_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Parse the canonical 44-character text form.
    pub fn from_text(s: &str) -> TypeResult<Self> {
        if s.len() != ID_TEXT_LEN {
            return Err(TypeError::InvalidLength {
                expected: ID_TEXT_LEN,
                actual: s.len(),
            });
        }
        text::decode_array::<ID_LEN>(s).map(Self)
    }

    /// Canonical text form.
    pub fn to_text(&self) -> String {
        text::encode(&self.0)
    }

    /// The raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.short_hex())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Id {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl TryFrom<&[u8]> for Id {
    type Error = TypeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}

impl From<[u8; ID_LEN]> for Id {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Id> for [u8; ID_LEN] {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_text(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn of_is_deterministic() {
        assert_eq!(Id::of(b"hello world"), Id::of(b"hello world"));
        assert_ne!(Id::of(b"hello"), Id::of(b"world"));
    }

    #[test]
    fn random_ids_are_unique() {
        assert_ne!(Id::random(), Id::random());
    }

    #[test]
    fn from_slice_rejects_short_and_long() {
        assert_eq!(
            Id::from_slice(&[0u8; 31]).unwrap_err(),
            TypeError::InvalidLength {
                expected: 32,
                actual: 31
            }
        );
        assert!(Id::from_slice(&[0u8; 33]).is_err());
        assert!(Id::from_slice(&[]).is_err());
    }

    #[test]
    fn from_text_rejects_wrong_text_length() {
        let text = Id::random().to_text();
        assert!(Id::from_text(&text[..43]).is_err());
        assert!(Id::from_text(&format!("{text}A")).is_err());
    }

    #[test]
    fn from_text_rejects_bad_alphabet() {
        let bad = "+".repeat(43) + "=";
        assert!(matches!(
            Id::from_text(&bad),
            Err(TypeError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn display_is_text_form() {
        let id = Id::of(b"display");
        assert_eq!(format!("{id}"), id.to_text());
        assert_eq!(id.to_string().parse::<Id>().unwrap(), id);
    }

    #[test]
    fn serde_uses_text_form() {
        let id = Id::of(b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_text()));
        let parsed: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_rejects_short_text() {
        assert!(serde_json::from_str::<Id>("\"AAAA\"").is_err());
    }

    proptest! {
        #[test]
        fn text_roundtrip_is_exact(bytes in any::<[u8; 32]>()) {
            let id = Id::from_array(bytes);
            let text = id.to_text();
            prop_assert_eq!(text.len(), ID_TEXT_LEN);
            prop_assert_eq!(Id::from_text(&text).unwrap(), id);
        }
    }
}
