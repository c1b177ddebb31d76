use std::io;

use reef_types::TypeError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Chunk size outside `(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
    #[error("chunk size {0} out of range: must be greater than 1024 and at most 1048576")]
    InvalidChunkSize(u64),

    /// A sealed chunk failed tag verification (tampered or corrupt).
    #[error("failed to authenticate chunk {index}")]
    ChunkAuthentication { index: u64 },

    /// The sealed symmetric key could not be opened.
    #[error("failed to unseal key")]
    KeyUnseal,

    /// An operation needed a secret key the identity does not hold.
    #[error("identity {0} lacks a secret key")]
    MissingSecretKey(String),

    /// A secret key was paired with a public key it does not derive.
    #[error("secret key does not match public key {0}")]
    KeyMismatch(String),

    /// A sealed key blob has the wrong shape.
    #[error("invalid sealed key: {0}")]
    InvalidSealedKey(String),

    /// The cipher stream is structurally malformed.
    #[error("corrupt cipher stream: {0}")]
    CorruptStream(String),

    /// The AEAD primitive refused to encrypt.
    #[error("encryption failed")]
    Encryption,

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CryptoError {
    /// Wrap as an `io::Error` so it can cross `Read`/`SliceReader` boundaries.
    pub fn into_io(self) -> io::Error {
        match self {
            CryptoError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }

    /// Recover a `CryptoError` that crossed an IO boundary via [`into_io`].
    ///
    /// [`into_io`]: CryptoError::into_io
    pub fn from_io(err: io::Error) -> Self {
        if !err
            .get_ref()
            .is_some_and(|inner| inner.is::<CryptoError>())
        {
            return CryptoError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner() {
            Some(inner) => match inner.downcast::<CryptoError>() {
                Ok(e) => *e,
                Err(other) => CryptoError::Io(io::Error::new(kind, other)),
            },
            None => CryptoError::Io(io::Error::from(kind)),
        }
    }
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_roundtrip_preserves_variant() {
        let io = CryptoError::ChunkAuthentication { index: 7 }.into_io();
        assert_eq!(io.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(
            CryptoError::from_io(io),
            CryptoError::ChunkAuthentication { index: 7 }
        ));
    }

    #[test]
    fn plain_io_errors_stay_io() {
        let err = CryptoError::from_io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        match err {
            CryptoError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected {other:?}"),
        }
    }
}
