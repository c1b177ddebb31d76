use std::io::{self, Write};

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::error::{CryptoError, CryptoResult};
use crate::key::StreamKey;
use crate::nonce::{self, Nonce, NONCE_LEN};
use crate::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, TAG_LEN};

/// Reject chunk sizes outside `(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
pub(crate) fn check_chunk_size(chunk_size: usize) -> CryptoResult<()> {
    if chunk_size <= MIN_CHUNK_SIZE || chunk_size > MAX_CHUNK_SIZE {
        return Err(CryptoError::InvalidChunkSize(chunk_size as u64));
    }
    Ok(())
}

/// Total sealed stream length for `plain` bytes of input.
///
/// An empty input still produces one (empty) sealed chunk. Fails for chunk
/// sizes that leave no room for plaintext.
pub fn sealed_len(plain: u64, chunk_size: u64) -> CryptoResult<u64> {
    if chunk_size <= TAG_LEN as u64 {
        return Err(CryptoError::InvalidChunkSize(chunk_size));
    }
    let per_chunk = chunk_size - TAG_LEN as u64;
    let chunks = plain.div_ceil(per_chunk).max(1);
    chunks
        .checked_mul(TAG_LEN as u64)
        .and_then(|tags| tags.checked_add(plain))
        .and_then(|len| len.checked_add(NONCE_LEN as u64))
        .ok_or_else(|| CryptoError::CorruptStream(format!("{plain} bytes overflow a stream")))
}

/// Plaintext length carried by a sealed stream of `sealed` bytes.
pub fn plain_len(sealed: u64, chunk_size: u64) -> CryptoResult<u64> {
    let min = (NONCE_LEN + TAG_LEN) as u64;
    if sealed < min {
        return Err(CryptoError::CorruptStream(format!(
            "stream of {sealed} bytes is shorter than {min}"
        )));
    }
    if chunk_size <= TAG_LEN as u64 {
        return Err(CryptoError::InvalidChunkSize(chunk_size));
    }
    let body = sealed - NONCE_LEN as u64;
    let chunks = body.div_ceil(chunk_size);
    let last = body - (chunks - 1) * chunk_size;
    if last < TAG_LEN as u64 {
        return Err(CryptoError::CorruptStream(format!(
            "trailing chunk of {last} bytes is shorter than its tag"
        )));
    }
    Ok(body - chunks * TAG_LEN as u64)
}

/// Streaming encryptor producing `base nonce ‖ chunk₀ ‖ chunk₁ ‖ …`.
///
/// Input is buffered into chunks of `chunk_size - 16` plaintext bytes. A full
/// chunk is sealed once more input arrives, so the final chunk is only sealed
/// by [`finish`](Self::finish). Finishing never closes the underlying sink.
pub struct CipherWriter<W> {
    inner: W,
    key: StreamKey,
    cipher: XChaCha20Poly1305,
    base_nonce: Nonce,
    nonce: Nonce,
    chunk_size: usize,
    buf: Vec<u8>,
    chunk_index: u64,
    written: u64,
    started: bool,
    finished: bool,
}

impl<W: Write> CipherWriter<W> {
    /// Create a writer over `inner`.
    pub fn new(
        inner: W,
        key: &StreamKey,
        base_nonce: Nonce,
        chunk_size: usize,
    ) -> CryptoResult<Self> {
        check_chunk_size(chunk_size)?;
        Ok(Self {
            inner,
            key: key.clone(),
            cipher: key.cipher(),
            base_nonce,
            nonce: base_nonce,
            chunk_size,
            buf: Vec::with_capacity(chunk_size - TAG_LEN),
            chunk_index: 0,
            written: 0,
            started: false,
            finished: false,
        })
    }

    /// Create a writer with a fresh random base nonce.
    pub fn with_random_nonce(inner: W, key: &StreamKey, chunk_size: usize) -> CryptoResult<Self> {
        Self::new(inner, key, nonce::random(), chunk_size)
    }

    pub fn base_nonce(&self) -> &Nonce {
        &self.base_nonce
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks sealed so far.
    pub fn chunk_index(&self) -> u64 {
        self.chunk_index
    }

    /// Bytes written to the sink so far, base nonce included.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Direct access to the sink. Bytes written here bypass the cipher.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Seal the trailing chunk and flush the sink.
    ///
    /// Calling it again is a no-op.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.start()?;
        self.seal_chunk()?;
        self.finished = true;
        self.inner.flush()
    }

    /// Hand back the current sink and start an identical stream (same key,
    /// same base nonce) over `sink`.
    pub fn reset<W2: Write>(self, sink: W2) -> (W, CipherWriter<W2>) {
        let next = CipherWriter {
            inner: sink,
            cipher: self.key.cipher(),
            key: self.key,
            base_nonce: self.base_nonce,
            nonce: self.base_nonce,
            chunk_size: self.chunk_size,
            buf: Vec::with_capacity(self.chunk_size - TAG_LEN),
            chunk_index: 0,
            written: 0,
            started: false,
            finished: false,
        };
        (self.inner, next)
    }

    /// Recover the sink. Unfinished data is discarded.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn start(&mut self) -> io::Result<()> {
        if !self.started {
            self.inner.write_all(&self.base_nonce)?;
            self.written += NONCE_LEN as u64;
            self.started = true;
        }
        Ok(())
    }

    fn seal_chunk(&mut self) -> io::Result<()> {
        let sealed = self
            .cipher
            .encrypt(XNonce::from_slice(&self.nonce), self.buf.as_slice())
            .map_err(|_| CryptoError::Encryption.into_io())?;
        self.inner.write_all(&sealed)?;
        self.written += sealed.len() as u64;
        self.buf.clear();
        self.chunk_index += 1;
        nonce::increment(&mut self.nonce);
        Ok(())
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::other("write to a finished cipher stream"));
        }
        if data.is_empty() {
            return Ok(0);
        }
        self.start()?;
        let capacity = self.chunk_size - TAG_LEN;
        let mut rest = data;
        while !rest.is_empty() {
            if self.buf.len() == capacity {
                self.seal_chunk()?;
            }
            let take = (capacity - self.buf.len()).min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
        }
        Ok(data.len())
    }

    /// Flushes the sink only; buffered plaintext stays until [`finish`].
    ///
    /// [`finish`]: CipherWriter::finish
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W> std::fmt::Debug for CipherWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherWriter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_index", &self.chunk_index)
            .field("written", &self.written)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_CHUNK_SIZE;

    fn seal(data: &[u8], chunk_size: usize) -> (Vec<u8>, u64) {
        let key = StreamKey::generate();
        let mut writer = CipherWriter::with_random_nonce(Vec::new(), &key, chunk_size).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
        let written = writer.written();
        (writer.into_inner(), written)
    }

    #[test]
    fn chunk_size_bounds() {
        let key = StreamKey::generate();
        let nonce = [0u8; NONCE_LEN];
        let err = CipherWriter::new(Vec::new(), &key, nonce, 1024).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidChunkSize(1024)));
        assert!(CipherWriter::new(Vec::new(), &key, nonce, 1025).is_ok());
        assert!(CipherWriter::new(Vec::new(), &key, nonce, MAX_CHUNK_SIZE).is_ok());
        assert!(CipherWriter::new(Vec::new(), &key, nonce, MAX_CHUNK_SIZE + 1).is_err());
    }

    #[test]
    fn empty_stream_is_nonce_plus_tag() {
        let (out, written) = seal(b"", DEFAULT_CHUNK_SIZE);
        assert_eq!(out.len(), NONCE_LEN + TAG_LEN);
        assert_eq!(written, out.len() as u64);
    }

    #[test]
    fn written_matches_sealed_len() {
        let c = 1100usize;
        let per = c - TAG_LEN;
        for size in [0, 1, per - 1, per, per + 1, 3 * per, 3 * per + 7] {
            let data = vec![0x5au8; size];
            let (out, written) = seal(&data, c);
            assert_eq!(written, out.len() as u64, "size {size}");
            assert_eq!(written, sealed_len(size as u64, c as u64).unwrap(), "size {size}");
            assert_eq!(plain_len(written, c as u64).unwrap(), size as u64, "size {size}");
        }
    }

    #[test]
    fn length_helpers_reject_tag_sized_chunks() {
        for c in [0u64, 10, TAG_LEN as u64] {
            assert!(matches!(
                sealed_len(10, c),
                Err(CryptoError::InvalidChunkSize(_))
            ));
            assert!(matches!(
                plain_len(100, c),
                Err(CryptoError::InvalidChunkSize(_))
            ));
        }
        assert_eq!(sealed_len(1, TAG_LEN as u64 + 1).unwrap(), (NONCE_LEN + TAG_LEN + 1) as u64);
        assert!(sealed_len(u64::MAX, 2048).is_err());
    }

    #[test]
    fn output_starts_with_base_nonce() {
        let key = StreamKey::generate();
        let nonce = [7u8; NONCE_LEN];
        let mut writer = CipherWriter::new(Vec::new(), &key, nonce, 2048).unwrap();
        writer.write_all(b"payload").unwrap();
        writer.finish().unwrap();
        assert_eq!(&writer.get_ref()[..NONCE_LEN], &nonce);
        assert_eq!(writer.chunk_index(), 1);
    }

    #[test]
    fn reset_reproduces_identical_stream() {
        let key = StreamKey::generate();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut first = CipherWriter::with_random_nonce(Vec::new(), &key, 1500).unwrap();
        first.write_all(&data).unwrap();
        first.finish().unwrap();
        let (a, mut second) = first.reset(Vec::new());
        assert_eq!(second.written(), 0);
        second.write_all(&data).unwrap();
        second.finish().unwrap();
        assert_eq!(a, second.into_inner());
    }

    #[test]
    fn write_after_finish_fails() {
        let key = StreamKey::generate();
        let mut writer = CipherWriter::with_random_nonce(Vec::new(), &key, 2048).unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert!(writer.write(b"late").is_err());
    }

    #[test]
    fn plain_len_rejects_malformed_lengths() {
        assert!(matches!(
            plain_len(10, 2048),
            Err(CryptoError::CorruptStream(_))
        ));
        // One full chunk plus a trailing fragment shorter than a tag.
        let sealed = (NONCE_LEN + 2048 + 5) as u64;
        assert!(matches!(
            plain_len(sealed, 2048),
            Err(CryptoError::CorruptStream(_))
        ));
        assert!(matches!(
            plain_len(100, 16),
            Err(CryptoError::InvalidChunkSize(16))
        ));
    }
}
