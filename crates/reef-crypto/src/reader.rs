use std::io;
use std::sync::Mutex;

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use reef_types::SliceReader;
use tracing::trace;

use crate::error::{CryptoError, CryptoResult};
use crate::key::StreamKey;
use crate::nonce::{self, Nonce, NONCE_LEN};
use crate::writer::plain_len;
use crate::TAG_LEN;

/// Random-access decryptor over a sealed stream.
///
/// Reads address the *plaintext*. Each covering chunk is located from its
/// index, opened under `base + index`, and verified before any of its bytes
/// are returned. The most recently opened chunk is kept so that small
/// sequential reads do not re-open it.
///
/// The chunk size only has to exceed the tag length here; a stream sealed as
/// a single chunk can be read back with its full body length as chunk size.
pub struct CipherReader<R> {
    source: R,
    cipher: XChaCha20Poly1305,
    base_nonce: Nonce,
    chunk_size: u64,
    body_len: u64,
    plain_len: u64,
    last: Mutex<Option<(u64, Vec<u8>)>>,
}

impl<R: SliceReader> CipherReader<R> {
    pub fn new(source: R, key: &StreamKey, chunk_size: u64) -> CryptoResult<Self> {
        if chunk_size <= TAG_LEN as u64 {
            return Err(CryptoError::InvalidChunkSize(chunk_size));
        }
        let total = source.len()?;
        let plain_len = plain_len(total, chunk_size)?;
        let mut base_nonce = [0u8; NONCE_LEN];
        source.read_exact_at(0, &mut base_nonce)?;
        Ok(Self {
            source,
            cipher: key.cipher(),
            base_nonce,
            chunk_size,
            body_len: total - NONCE_LEN as u64,
            plain_len,
            last: Mutex::new(None),
        })
    }

    /// Length of the decrypted stream.
    pub fn plain_len(&self) -> u64 {
        self.plain_len
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> u64 {
        self.body_len.div_ceil(self.chunk_size)
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Read and authenticate chunk `index`.
    pub fn open_chunk(&self, index: u64) -> CryptoResult<Vec<u8>> {
        if index >= self.chunk_count() {
            return Err(CryptoError::CorruptStream(format!(
                "chunk {index} out of range ({} chunks)",
                self.chunk_count()
            )));
        }
        let start = index * self.chunk_size;
        let len = (self.body_len - start).min(self.chunk_size) as usize;
        let mut sealed = vec![0u8; len];
        self.source
            .read_exact_at(NONCE_LEN as u64 + start, &mut sealed)?;
        let nonce = nonce::advance(&self.base_nonce, index);
        trace!(index, len, "opening chunk");
        self.cipher
            .decrypt(XNonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| CryptoError::ChunkAuthentication { index })
    }

    fn with_chunk<T>(&self, index: u64, f: impl FnOnce(&[u8]) -> T) -> CryptoResult<T> {
        let mut last = self.last.lock().expect("lock poisoned");
        if let Some((cached, chunk)) = last.as_ref() {
            if *cached == index {
                return Ok(f(chunk));
            }
        }
        let chunk = self.open_chunk(index)?;
        let out = f(&chunk);
        *last = Some((index, chunk));
        Ok(out)
    }
}

impl<R: SliceReader> SliceReader for CipherReader<R> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.plain_len || buf.is_empty() {
            return Ok(0);
        }
        let per_chunk = self.chunk_size - TAG_LEN as u64;
        let want = (self.plain_len - offset).min(buf.len() as u64) as usize;
        trace!(offset, want, "cipher read");
        let mut filled = 0usize;
        while filled < want {
            let pos = offset + filled as u64;
            let index = pos / per_chunk;
            let within = (pos % per_chunk) as usize;
            let dest = &mut buf[filled..want];
            let n = self
                .with_chunk(index, |chunk| {
                    let avail = chunk.len().saturating_sub(within);
                    let n = avail.min(dest.len());
                    dest[..n].copy_from_slice(&chunk[within..within + n]);
                    n
                })
                .map_err(CryptoError::into_io)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.plain_len)
    }
}

impl<R> std::fmt::Debug for CipherReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherReader")
            .field("chunk_size", &self.chunk_size)
            .field("plain_len", &self.plain_len)
            .finish()
    }
}
