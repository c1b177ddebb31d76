//! Two-length-prefix framing shared by messages and envelopes.
//!
//! ```text
//! [u64 BE header length][header JSON][u64 BE content length][content]
//! ```

use std::io::Write;

use reef_types::{Section, SharedReader, SliceReader};

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::header::Header;

/// Largest header accepted when decoding.
pub const MAX_HEADER_LEN: u64 = 1024 * 1024;

const PREFIX_LEN: u64 = 8;

/// Write the header and the content length prefix. The caller writes exactly
/// `content_len` content bytes afterwards.
pub(crate) fn write_head<W: Write + ?Sized>(
    writer: &mut W,
    header: &Header,
    content_len: u64,
) -> EnvelopeResult<u64> {
    let json = header.to_json()?;
    writer.write_all(&(json.len() as u64).to_be_bytes())?;
    writer.write_all(&json)?;
    writer.write_all(&content_len.to_be_bytes())?;
    Ok(2 * PREFIX_LEN + json.len() as u64)
}

/// Total framed length for an encoded header of `header_len` bytes.
pub(crate) fn framed_len(header_len: u64, content_len: u64) -> u64 {
    2 * PREFIX_LEN + header_len + content_len
}

fn read_u64(source: &Section<SharedReader>, offset: u64) -> EnvelopeResult<u64> {
    let mut buf = [0u8; PREFIX_LEN as usize];
    source.read_exact_at(offset, &mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Decode the header and locate the content without reading it.
///
/// Both length fields are checked against the bytes actually available before
/// anything is allocated from them.
pub(crate) fn read_frame(
    source: &Section<SharedReader>,
) -> EnvelopeResult<(Header, Section<SharedReader>)> {
    let total = source.len();
    if total < 2 * PREFIX_LEN {
        return Err(EnvelopeError::Corrupt(format!(
            "frame of {total} bytes is shorter than its length prefixes"
        )));
    }

    let header_len = read_u64(source, 0)?;
    let available = total - 2 * PREFIX_LEN;
    if header_len > available || header_len > MAX_HEADER_LEN {
        return Err(EnvelopeError::FrameTooLarge {
            field: "header",
            len: header_len,
            available: available.min(MAX_HEADER_LEN),
        });
    }
    let mut json = vec![0u8; header_len as usize];
    source.read_exact_at(PREFIX_LEN, &mut json)?;
    let header = Header::from_json(&json)?;

    let content_len = read_u64(source, PREFIX_LEN + header_len)?;
    let available = available - header_len;
    if content_len > available {
        return Err(EnvelopeError::FrameTooLarge {
            field: "content",
            len: content_len,
            available,
        });
    }
    if content_len < available {
        return Err(EnvelopeError::Corrupt(format!(
            "{} trailing bytes after content",
            available - content_len
        )));
    }

    let content = source.sub(2 * PREFIX_LEN + header_len, content_len)?;
    Ok((header, content))
}
