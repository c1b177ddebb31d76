use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::ChaChaBox;
use serde::{Deserialize, Serialize};

use reef_types::{text, TypeError};

use crate::error::{CryptoError, CryptoResult};
use crate::nonce::NONCE_LEN;

/// Byte length of public and secret keys.
pub const KEY_LEN: usize = crypto_box::KEY_SIZE;

/// X25519 public key.
#[derive(Clone)]
pub struct PublicKey(crypto_box::PublicKey);

/// X25519 secret key.
#[derive(Clone)]
pub struct SecretKey(crypto_box::SecretKey);

impl PublicKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }

    /// Create from a slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr = <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| TypeError::InvalidLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::from(arr))
    }

    /// Padded URL-safe base64 text form (44 characters).
    pub fn to_text(&self) -> String {
        text::encode(self.as_bytes())
    }

    /// Parse the text form.
    pub fn from_text(s: &str) -> CryptoResult<Self> {
        Ok(Self::from(text::decode_array::<KEY_LEN>(s)?))
    }
}

impl From<[u8; KEY_LEN]> for PublicKey {
    fn from(value: [u8; KEY_LEN]) -> Self {
        Self(crypto_box::PublicKey::from(value))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.as_bytes()[..8]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        Self(crypto_box::SecretKey::generate(&mut OsRng))
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Raw secret key bytes.
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    /// Create from a slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr = <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| TypeError::InvalidLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::from(arr))
    }
}

impl From<[u8; KEY_LEN]> for SecretKey {
    fn from(value: [u8; KEY_LEN]) -> Self {
        Self(crypto_box::SecretKey::from(value))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<redacted>)")
    }
}

/// An asymmetric key pair.
///
/// The public key is always present. The secret key is present only for
/// identities the local process controls; identities known only as a sender
/// or recipient reference carry the public half alone. Identities are
/// immutable once constructed.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "IdentityRepr", into = "IdentityRepr")]
pub struct Identity {
    public: PublicKey,
    secret: Option<SecretKey>,
}

impl Identity {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        let secret = SecretKey::generate();
        Self {
            public: secret.public_key(),
            secret: Some(secret),
        }
    }

    /// A reference-only identity (no secret key).
    pub fn from_public(public: PublicKey) -> Self {
        Self {
            public,
            secret: None,
        }
    }

    /// A controlled identity derived from its secret key.
    pub fn from_secret(secret: SecretKey) -> Self {
        Self {
            public: secret.public_key(),
            secret: Some(secret),
        }
    }

    /// Pair a public key with an optional secret key.
    ///
    /// Fails if the secret key does not derive the given public key.
    pub fn from_parts(public: PublicKey, secret: Option<SecretKey>) -> CryptoResult<Self> {
        if let Some(secret) = &secret {
            if secret.public_key() != public {
                return Err(CryptoError::KeyMismatch(public.to_text()));
            }
        }
        Ok(Self { public, secret })
    }

    /// Build from raw key bytes; both halves are length-checked.
    pub fn from_bytes(public: &[u8], secret: Option<&[u8]>) -> CryptoResult<Self> {
        let public = PublicKey::from_slice(public)?;
        let secret = secret.map(SecretKey::from_slice).transpose()?;
        Self::from_parts(public, secret)
    }

    /// The public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The secret key, if this identity is controlled locally.
    pub fn secret_key(&self) -> Option<&SecretKey> {
        self.secret.as_ref()
    }

    /// Returns `true` if this identity holds its secret key.
    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// This identity without its secret key.
    pub fn to_public(&self) -> Identity {
        Identity::from_public(self.public.clone())
    }

    fn require_secret(&self) -> CryptoResult<&SecretKey> {
        self.secret
            .as_ref()
            .ok_or_else(|| CryptoError::MissingSecretKey(self.public.to_text()))
    }

    fn shared_box(&self, other: &PublicKey) -> CryptoResult<ChaChaBox> {
        let secret = self.require_secret()?;
        Ok(ChaChaBox::new(&other.0, &secret.0))
    }

    /// Seal `cleartext` for `recipient` under a fresh random nonce.
    ///
    /// Returns `nonce ‖ ciphertext ‖ tag`.
    pub fn seal_to(&self, recipient: &PublicKey, cleartext: &[u8]) -> CryptoResult<Vec<u8>> {
        let shared = self.shared_box(recipient)?;
        let nonce = ChaChaBox::generate_nonce(&mut OsRng);
        let ciphertext = shared
            .encrypt(&nonce, cleartext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut sealed = nonce.to_vec();
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Open a blob produced by [`seal_to`](Self::seal_to) from `sender`.
    pub fn open_from(&self, sender: &PublicKey, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        let shared = self.shared_box(sender)?;
        if sealed.len() <= NONCE_LEN {
            return Err(CryptoError::InvalidSealedKey(format!(
                "sealed blob too short: {} bytes",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = crypto_box::aead::Nonce::<ChaChaBox>::from_slice(nonce);
        shared
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::KeyUnseal)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public && self.has_secret() == other.has_secret()
    }
}

impl Eq for Identity {}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public)
            .field("has_secret", &self.has_secret())
            .finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_secret() {
            write!(f, "<Identity {}!>", self.public)
        } else {
            write!(f, "<Identity {}>", self.public)
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct IdentityRepr {
    public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret_key: Option<String>,
}

impl TryFrom<IdentityRepr> for Identity {
    type Error = CryptoError;

    fn try_from(repr: IdentityRepr) -> Result<Self, Self::Error> {
        let public = PublicKey::from_text(&repr.public_key)?;
        let secret = repr
            .secret_key
            .map(|s| text::decode_array::<KEY_LEN>(&s).map(SecretKey::from))
            .transpose()?;
        Identity::from_parts(public, secret)
    }
}

impl From<Identity> for IdentityRepr {
    fn from(identity: Identity) -> Self {
        Self {
            public_key: identity.public.to_text(),
            secret_key: identity.secret.map(|s| text::encode(&s.to_bytes())),
        }
    }
}
