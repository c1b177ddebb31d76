use std::io::{self, Read, Write};

use sha2::{Digest, Sha512};

use reef_types::text;

/// Streaming SHA-512 content hasher.
///
/// Implements [`Write`] so it can sit at the end of any writer chain, for
/// example behind a [`CipherWriter`](crate::CipherWriter) to learn the hash of
/// a ciphertext without buffering it. Digests are reported in the same
/// URL-safe base64 text form used for ids and keys.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha512,
    len: u64,
}

impl ContentHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if nothing has been hashed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw 64-byte digest.
    pub fn finalize(self) -> [u8; 64] {
        let digest = self.inner.finalize();
        let mut out = [0u8; 64];
        out.copy_from_slice(&digest);
        out
    }

    /// Digest in text form.
    pub fn finalize_text(self) -> String {
        text::encode(&self.finalize())
    }

    /// Hash a byte slice, returning the text form.
    pub fn hash_text(data: &[u8]) -> String {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize_text()
    }

    /// Hash everything `reader` yields, returning the text form.
    pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
        let mut hasher = Self::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(hasher.finalize_text())
    }
}

impl Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(
            ContentHasher::hash_text(b"hello world!"),
            ContentHasher::hash_text(b"hello world!")
        );
        assert_ne!(
            ContentHasher::hash_text(b"hello"),
            ContentHasher::hash_text(b"world")
        );
    }

    #[test]
    fn text_form_is_88_chars() {
        assert_eq!(ContentHasher::hash_text(b"").len(), 88);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut hasher = ContentHasher::new();
        hasher.write_all(b"hello ").unwrap();
        hasher.write_all(b"world!").unwrap();
        assert_eq!(hasher.len(), 12);
        assert_eq!(hasher.finalize_text(), ContentHasher::hash_text(b"hello world!"));
    }

    #[test]
    fn hash_reader_matches_one_shot() {
        let hashed = ContentHasher::hash_reader(&b"from a reader"[..]).unwrap();
        assert_eq!(hashed, ContentHasher::hash_text(b"from a reader"));
    }
}
