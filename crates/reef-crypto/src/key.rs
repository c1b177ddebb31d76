use chacha20poly1305::aead::KeyInit;
use chacha20poly1305::{Key, XChaCha20Poly1305};

use crate::error::{CryptoError, CryptoResult};
use crate::identity::{Identity, PublicKey, KEY_LEN};
use crate::nonce::NONCE_LEN;
use crate::TAG_LEN;

/// Length of a sealed stream key: `nonce ‖ key ‖ tag`.
pub const SEALED_KEY_LEN: usize = NONCE_LEN + KEY_LEN + TAG_LEN;

/// Symmetric key for the chunked stream cipher.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamKey([u8; KEY_LEN]);

impl StreamKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::Rng::fill(&mut rand::rngs::OsRng, &mut bytes);
        Self(bytes)
    }

    /// Create from raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub(crate) fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Seal this key from `sender` to `recipient`.
    ///
    /// The result is exactly [`SEALED_KEY_LEN`] bytes.
    pub fn seal(&self, sender: &Identity, recipient: &PublicKey) -> CryptoResult<Vec<u8>> {
        sender.seal_to(recipient, &self.0)
    }

    /// Open a sealed key addressed to `recipient` by `sender`.
    pub fn unseal(sealed: &[u8], recipient: &Identity, sender: &PublicKey) -> CryptoResult<Self> {
        if sealed.len() != SEALED_KEY_LEN {
            return Err(CryptoError::InvalidSealedKey(format!(
                "expected {SEALED_KEY_LEN} bytes, got {}",
                sealed.len()
            )));
        }
        let opened = recipient.open_from(sender, sealed)?;
        let bytes = <[u8; KEY_LEN]>::try_from(opened.as_slice()).map_err(|_| {
            CryptoError::InvalidSealedKey(format!("unsealed key is {} bytes", opened.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StreamKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_key_has_fixed_length() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let sealed = StreamKey::generate().seal(&alice, bob.public_key()).unwrap();
        assert_eq!(sealed.len(), SEALED_KEY_LEN);
    }

    #[test]
    fn seal_unseal_roundtrip() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let key = StreamKey::generate();
        let sealed = key.seal(&alice, bob.public_key()).unwrap();
        let opened = StreamKey::unseal(&sealed, &bob, alice.public_key()).unwrap();
        assert_eq!(opened, key);
    }

    #[test]
    fn unseal_rejects_wrong_length() {
        let bob = Identity::generate();
        let err = StreamKey::unseal(&[0u8; 10], &bob, bob.public_key()).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidSealedKey(_)));
    }

    #[test]
    fn unseal_rejects_flipped_bit() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let mut sealed = StreamKey::generate().seal(&alice, bob.public_key()).unwrap();
        sealed[NONCE_LEN + 3] ^= 0x01;
        let err = StreamKey::unseal(&sealed, &bob, alice.public_key()).unwrap_err();
        assert!(matches!(err, CryptoError::KeyUnseal));
    }

    #[test]
    fn unseal_needs_secret_key() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let sealed = StreamKey::generate().seal(&alice, bob.public_key()).unwrap();
        let err = StreamKey::unseal(&sealed, &bob.to_public(), alice.public_key()).unwrap_err();
        assert!(matches!(err, CryptoError::MissingSecretKey(_)));
    }

    #[test]
    fn debug_redacts() {
        assert!(format!("{:?}", StreamKey::generate()).contains("redacted"));
    }
}
