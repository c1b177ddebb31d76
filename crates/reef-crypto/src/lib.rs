//! Cryptographic primitives for Reef.
//!
//! Provides key-pair identities with sealed-box key exchange, SHA-512 content
//! hashing, and a chunked authenticated stream cipher whose reader supports
//! random access by deriving each chunk's nonce from its index.
//!
//! All crypto operations wrap established libraries.
//! Key exchange is X25519 + XChaCha20-Poly1305 (`crypto_box::ChaChaBox`);
//! stream chunks are sealed with XChaCha20-Poly1305.
//!
//! # Stream layout
//!
//! ```text
//! [24 bytes: base nonce][chunk 0][chunk 1]...[chunk n]
//! ```
//!
//! Every chunk except the last is exactly `chunk_size` bytes on the wire and
//! carries `chunk_size - 16` bytes of plaintext. The last chunk may be shorter
//! but always carries at least its 16-byte tag.

pub mod error;
pub mod hasher;
pub mod identity;
pub mod key;
pub mod nonce;
pub mod reader;
pub mod writer;

pub use error::{CryptoError, CryptoResult};
pub use hasher::ContentHasher;
pub use identity::{Identity, PublicKey, SecretKey, KEY_LEN};
pub use key::{StreamKey, SEALED_KEY_LEN};
pub use nonce::{Nonce, NONCE_LEN};
pub use reader::CipherReader;
pub use writer::{plain_len, sealed_len, CipherWriter};

/// Authentication tag overhead per sealed chunk.
pub const TAG_LEN: usize = 16;

/// Chunk sizes must be strictly greater than this.
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Chunk sizes must be at most this (1 MiB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Chunk size used when the caller has no preference.
pub const DEFAULT_CHUNK_SIZE: usize = 10240;
