use std::io;

use reef_crypto::CryptoError;
use reef_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("required header {0} is missing or empty")]
    MissingHeader(String),

    #[error("invalid header {key}: {reason}")]
    InvalidHeader { key: String, reason: String },

    #[error("header {0} is not a string")]
    NonStringHeader(String),

    #[error("envelope is addressed to {to}, not {me}")]
    WrongRecipient { to: String, me: String },

    #[error("content hash mismatch: header says {expected}, content hashes to {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("{field} length {len} exceeds the {available} bytes available")]
    FrameTooLarge {
        field: &'static str,
        len: u64,
        available: u64,
    },

    #[error("corrupt frame: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("header encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<io::Error> for EnvelopeError {
    /// Crypto failures surfaced through positional reads are recovered, so a
    /// tampered chunk reports as [`CryptoError::ChunkAuthentication`].
    fn from(err: io::Error) -> Self {
        match CryptoError::from_io(err) {
            CryptoError::Io(e) => EnvelopeError::Io(e),
            other => EnvelopeError::Crypto(other),
        }
    }
}

pub type EnvelopeResult<T> = Result<T, EnvelopeError>;
