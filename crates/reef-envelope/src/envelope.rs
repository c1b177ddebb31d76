use std::io::Write;
use std::sync::Arc;

use reef_crypto::{
    CipherReader, CipherWriter, ContentHasher, CryptoError, Identity, PublicKey, StreamKey,
    DEFAULT_CHUNK_SIZE,
};
use reef_types::{text, Section, SharedReader, SliceReader};
use tracing::debug;

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::frame;
use crate::header::{self, Header, ENVELOPE_REQUIRED, MESSAGE_REQUIRED};
use crate::message::Message;

/// Options for [`seal_with`].
#[derive(Clone, Copy, Debug)]
pub struct SealOptions {
    /// Sealed chunk size on the wire.
    pub chunk_size: usize,
}

impl Default for SealOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Seal `message` from `from` to `to` with default options.
pub fn seal<W: Write + ?Sized>(
    writer: &mut W,
    message: &Message,
    from: &Identity,
    to: &PublicKey,
    permit: &str,
) -> EnvelopeResult<u64> {
    seal_with(writer, message, from, to, permit, SealOptions::default())
}

/// Seal `message` into an envelope and write it to `writer`.
///
/// The framed plaintext is encrypted twice under the same key and nonce: once
/// into a hasher to learn the ciphertext hash and length, then into `writer`
/// behind the outer header. Returns the number of bytes written. On error the
/// output must be discarded.
pub fn seal_with<W: Write + ?Sized>(
    writer: &mut W,
    message: &Message,
    from: &Identity,
    to: &PublicKey,
    permit: &str,
    options: SealOptions,
) -> EnvelopeResult<u64> {
    message.header().validate(&MESSAGE_REQUIRED)?;
    if !from.has_secret() {
        return Err(CryptoError::MissingSecretKey(from.public_key().to_text()).into());
    }

    let key = StreamKey::generate();
    let mut hashing =
        CipherWriter::with_random_nonce(ContentHasher::new(), &key, options.chunk_size)?;
    message.serialize(&mut hashing)?;
    hashing.finish()?;
    let content_len = hashing.written();
    let (hasher, mut cipher) = hashing.reset(&mut *writer);
    let hash = hasher.finalize_text();

    let sealed_key = key.seal(from, to)?;
    let header = Header::new()
        .with(header::TO, to.to_text())
        .with(header::FROM, from.public_key().to_text())
        .with(header::HASH, hash)
        .with(header::CIPHER_KEY, text::encode(&sealed_key))
        .with(header::CIPHER_CHUNK_SIZE, options.chunk_size.to_string())
        .with(header::PERMIT, permit);

    let head = frame::write_head(cipher.get_mut(), &header, content_len)?;
    message.serialize(&mut cipher)?;
    cipher.finish()?;
    if cipher.written() != content_len {
        return Err(EnvelopeError::Corrupt(format!(
            "message changed while sealing: {} bytes then {content_len}",
            cipher.written()
        )));
    }
    debug!(
        to = %to,
        bytes = head + content_len,
        "sealed envelope"
    );
    Ok(head + content_len)
}

/// A parsed envelope whose content is still encrypted.
#[derive(Clone, Debug)]
pub struct CipherMessage {
    header: Header,
    content: Section<SharedReader>,
}

impl CipherMessage {
    /// Decode the outer frame held by any positional reader, for example an
    /// open blob file.
    pub fn parse(source: impl SliceReader + 'static) -> EnvelopeResult<Self> {
        let reader: SharedReader = Arc::new(source);
        Self::from_section(Section::full(reader)?)
    }

    pub fn from_section(source: Section<SharedReader>) -> EnvelopeResult<Self> {
        let (header, content) = frame::read_frame(&source)?;
        header.validate(&ENVELOPE_REQUIRED)?;
        Ok(Self { header, content })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The encrypted content range.
    pub fn content(&self) -> Section<SharedReader> {
        self.content.rewound()
    }

    /// Public key named in `To`.
    pub fn recipient(&self) -> EnvelopeResult<PublicKey> {
        key_header(&self.header, header::TO)
    }

    /// Public key named in `From`.
    pub fn sender(&self) -> EnvelopeResult<PublicKey> {
        key_header(&self.header, header::FROM)
    }

    pub fn permit(&self) -> Option<&str> {
        self.header.get(header::PERMIT)
    }

    /// Sealed chunk size, or the whole content length if the header is absent.
    pub fn chunk_size(&self) -> EnvelopeResult<u64> {
        match self.header.get(header::CIPHER_CHUNK_SIZE) {
            None | Some("") => Ok(self.content.len()),
            Some(raw) => raw.parse().map_err(|e| EnvelopeError::InvalidHeader {
                key: header::CIPHER_CHUNK_SIZE.to_string(),
                reason: format!("{raw:?}: {e}"),
            }),
        }
    }

    /// Check the ciphertext against the `Hash` header. Needs no keys.
    pub fn verify_hash(&self) -> EnvelopeResult<()> {
        let expected = self.header.require(header::HASH)?;
        let actual = ContentHasher::hash_reader(self.content())?;
        if actual != expected {
            return Err(EnvelopeError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Resolve the sender, recover the stream key, and set up decryption.
    ///
    /// `me` must be the recipient named in `To` and must hold its secret key.
    pub fn unseal(&self, me: &Identity) -> EnvelopeResult<OpenedEnvelope> {
        let to = self.header.require(header::TO)?;
        let mine = me.public_key().to_text();
        if to != mine {
            return Err(EnvelopeError::WrongRecipient {
                to: to.to_string(),
                me: mine,
            });
        }
        if !me.has_secret() {
            return Err(CryptoError::MissingSecretKey(mine).into());
        }

        let sender = Identity::from_public(self.sender()?);
        let sealed_key = text::decode(self.header.require(header::CIPHER_KEY)?).map_err(|e| {
            EnvelopeError::InvalidHeader {
                key: header::CIPHER_KEY.to_string(),
                reason: e.to_string(),
            }
        })?;
        let key = StreamKey::unseal(&sealed_key, me, sender.public_key())?;
        let chunk_size = self.chunk_size()?;
        let reader = CipherReader::new(self.content.rewound(), &key, chunk_size)?;
        debug!(from = %sender, chunk_size, "unsealed envelope");

        Ok(OpenedEnvelope {
            header: self.header.clone(),
            sender,
            chunk_size,
            content: Arc::new(reader),
        })
    }
}

fn key_header(header: &Header, key: &str) -> EnvelopeResult<PublicKey> {
    let raw = header.require(key)?;
    PublicKey::from_text(raw).map_err(|e| EnvelopeError::InvalidHeader {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// An envelope whose key has been recovered. Content is decrypted on read.
pub struct OpenedEnvelope {
    header: Header,
    sender: Identity,
    chunk_size: u64,
    content: Arc<CipherReader<Section<SharedReader>>>,
}

impl OpenedEnvelope {
    /// The outer header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The sender named in `From`, public key only.
    pub fn sender(&self) -> &Identity {
        &self.sender
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Length of the framed plaintext message.
    pub fn plain_len(&self) -> u64 {
        self.content.plain_len()
    }

    /// Decode the inner message. Its content is decrypted lazily.
    pub fn message(&self) -> EnvelopeResult<Message> {
        let reader: SharedReader = self.content.clone();
        Message::deserialize(Section::full(reader)?)
    }
}

impl std::fmt::Debug for OpenedEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedEnvelope")
            .field("sender", &self.sender)
            .field("chunk_size", &self.chunk_size)
            .field("plain_len", &self.plain_len())
            .finish()
    }
}
