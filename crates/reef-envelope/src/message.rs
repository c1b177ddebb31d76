use std::io::{self, Write};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use reef_crypto::ContentHasher;
use reef_types::{Section, SharedReader, SliceReader};

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::frame;
use crate::header::{self, Header, MESSAGE_REQUIRED};

/// A plaintext message: header metadata plus a bounded content range.
///
/// Content is never read eagerly. A deserialized message exposes its content
/// as a window over the source, so a message decoded from a cipher stream is
/// decrypted only as its content is read.
#[derive(Clone, Debug)]
pub struct Message {
    header: Header,
    content: Section<SharedReader>,
}

impl Message {
    /// Build a message over `content`, filling `DateTime` (RFC 3339, UTC) and
    /// `Hash` (SHA-512 of the content) if they are absent.
    pub fn new(header: Header, content: impl SliceReader + 'static) -> EnvelopeResult<Self> {
        let reader: SharedReader = Arc::new(content);
        Self::from_section(header, Section::full(reader)?)
    }

    /// Build a message over an owned buffer.
    pub fn from_bytes(header: Header, content: impl Into<Vec<u8>>) -> EnvelopeResult<Self> {
        Self::new(header, content.into())
    }

    pub fn from_section(
        mut header: Header,
        content: Section<SharedReader>,
    ) -> EnvelopeResult<Self> {
        if !header.contains(header::DATE_TIME) {
            header.insert(
                header::DATE_TIME,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        if !header.contains(header::HASH) {
            header.insert(header::HASH, ContentHasher::hash_reader(content.rewound())?);
        }
        Ok(Self { header, content })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header.get(header::CONTENT_TYPE)
    }

    /// Parsed `DateTime` header.
    pub fn date_time(&self) -> EnvelopeResult<DateTime<FixedOffset>> {
        let raw = self.header.require(header::DATE_TIME)?;
        DateTime::parse_from_rfc3339(raw).map_err(|e| EnvelopeError::InvalidHeader {
            key: header::DATE_TIME.to_string(),
            reason: e.to_string(),
        })
    }

    /// The content range with a fresh cursor at its start.
    pub fn content(&self) -> Section<SharedReader> {
        self.content.rewound()
    }

    pub fn content_len(&self) -> u64 {
        self.content.len()
    }

    /// Read the whole content into memory.
    pub fn read_content(&self) -> EnvelopeResult<Vec<u8>> {
        Ok(self.content.read_to_vec()?)
    }

    /// Recompute the content hash and compare it with the `Hash` header.
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

    /// Length of the framed form.
    pub fn framed_len(&self) -> EnvelopeResult<u64> {
        let header_len = self.header.to_json()?.len() as u64;
        Ok(frame::framed_len(header_len, self.content.len()))
    }

    /// Write the framed message. The header is validated before anything is
    /// written. Returns the number of bytes written.
    pub fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> EnvelopeResult<u64> {
        self.header.validate(&MESSAGE_REQUIRED)?;
        let content_len = self.content.len();
        let head = frame::write_head(writer, &self.header, content_len)?;
        let copied = io::copy(&mut self.content(), writer)?;
        if copied != content_len {
            return Err(EnvelopeError::Corrupt(format!(
                "content yielded {copied} of {content_len} bytes"
            )));
        }
        Ok(head + copied)
    }

    pub fn to_vec(&self) -> EnvelopeResult<Vec<u8>> {
        let mut out = Vec::new();
        self.serialize(&mut out)?;
        Ok(out)
    }

    /// Decode a framed message. The content stays in `source`.
    pub fn deserialize(source: Section<SharedReader>) -> EnvelopeResult<Self> {
        let (header, content) = frame::read_frame(&source)?;
        header.validate(&MESSAGE_REQUIRED)?;
        Ok(Self { header, content })
    }

    /// Decode a framed message held by any positional reader.
    pub fn parse(source: impl SliceReader + 'static) -> EnvelopeResult<Self> {
        let reader: SharedReader = Arc::new(source);
        Self::deserialize(Section::full(reader)?)
    }
}
