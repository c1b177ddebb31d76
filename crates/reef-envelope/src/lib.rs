//! Message framing and sealed envelopes for Reef.
//!
//! A [`Message`] is a string header plus a content range, framed as
//! `[u64 header len][header JSON][u64 content len][content]`. An envelope
//! uses the same framing: its header names the recipient, the sender, the
//! ciphertext hash and the sealed stream key, and its content is the framed
//! message encrypted with the chunked stream cipher.
//!
//! Opening is split in two steps with no hidden state. [`CipherMessage::parse`]
//! decodes the outer frame, then [`CipherMessage::unseal`] returns an
//! [`OpenedEnvelope`] holding the resolved sender, chunk size and a decrypting
//! reader.

pub mod envelope;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;

pub use envelope::{seal, seal_with, CipherMessage, OpenedEnvelope, SealOptions};
pub use error::{EnvelopeError, EnvelopeResult};
pub use frame::MAX_HEADER_LEN;
pub use header::Header;
pub use message::Message;
