//! Positional-read IO.
//!
//! [`SliceReader`] does not require the notion of a current position: every
//! read passes an explicit offset, and the length of the resource can be
//! queried. This is the shape random-access decryption needs, and it lets a
//! single file handle or buffer be shared by several independent readers.
//!
//! [`Section`] layers a bounded window with its own cursor on top, so callers
//! that want `Read + Seek` get them without disturbing anyone else.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;

/// A reference-counted, type-erased positional reader.
pub type SharedReader = Arc<dyn SliceReader>;

/// Read bytes at explicit offsets.
///
/// `read_at` returns at most `buf.len()` bytes. It may return fewer only when
/// the range runs past the end of the resource; a read starting at or beyond
/// the end returns `Ok(0)`.
#[allow(clippy::len_without_is_empty)]
pub trait SliceReader: Send + Sync {
    /// Read into `buf` starting at `offset`, returning the number of bytes read.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total length of the resource in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Fill `buf` completely or fail with `UnexpectedEof`.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    let rest = buf;
                    buf = &mut rest[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

pub(crate) fn limited_range(offset: u64, len: usize, buf_len: usize) -> std::ops::Range<usize> {
    if offset < buf_len as u64 {
        let start = offset as usize;
        let end = start.saturating_add(len).min(buf_len);
        start..end
    } else {
        0..0
    }
}

impl SliceReader for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let range = limited_range(offset, buf.len(), self.len());
        let n = range.len();
        buf[..n].copy_from_slice(&self[range]);
        Ok(n)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(<[u8]>::len(self) as u64)
    }
}

impl SliceReader for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.as_slice().read_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(Vec::len(self) as u64)
    }
}

impl SliceReader for Bytes {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.as_ref().read_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(Bytes::len(self) as u64)
    }
}

impl SliceReader for File {
    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        let len = self.metadata()?.len();
        if offset >= len {
            return Ok(0);
        }
        FileExt::seek_read(self, buf, offset)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl<T: SliceReader + ?Sized> SliceReader for Arc<T> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }
}

impl<T: SliceReader + ?Sized> SliceReader for Box<T> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }
}

impl<T: SliceReader + ?Sized> SliceReader for &T {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }
}

/// A bounded window `[start, start + len)` over a [`SliceReader`], with its
/// own read cursor.
///
/// Cloning a section yields an independent cursor over the same bytes.
#[derive(Clone)]
pub struct Section<R> {
    source: R,
    start: u64,
    len: u64,
    pos: u64,
}

impl<R: SliceReader> Section<R> {
    /// Window over `len` bytes of `source` beginning at `start`.
    pub fn new(source: R, start: u64, len: u64) -> Self {
        Self {
            source,
            start,
            len,
            pos: 0,
        }
    }

    /// Window over the whole of `source`.
    pub fn full(source: R) -> io::Result<Self> {
        let len = source.len()?;
        Ok(Self::new(source, 0, len))
    }

    /// Length of the window.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the window inside its source.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Current cursor position relative to the window start.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// The underlying source.
    pub fn source(&self) -> &R {
        &self.source
    }

    /// A copy of this window with its cursor back at the start.
    pub fn rewound(&self) -> Self
    where
        R: Clone,
    {
        Self::new(self.source.clone(), self.start, self.len)
    }

    /// A nested window, relative to this one. Fails if it does not fit.
    pub fn sub(&self, start: u64, len: u64) -> io::Result<Self>
    where
        R: Clone,
    {
        let end = start.checked_add(len).filter(|end| *end <= self.len);
        if end.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "sub-range {start}+{len} exceeds section length {}",
                    self.len
                ),
            ));
        }
        Ok(Self::new(self.source.clone(), self.start + start, len))
    }

    /// Read the whole window into memory, independent of the cursor.
    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let len = usize::try_from(self.len)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "section too large"))?;
        let mut buf = vec![0u8; len];
        self.read_exact_at(0, &mut buf)?;
        Ok(buf)
    }
}

impl<R: SliceReader> SliceReader for Section<R> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let max = (self.len - offset).min(buf.len() as u64) as usize;
        self.source.read_at(self.start + offset, &mut buf[..max])
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.len)
    }
}

impl<R: SliceReader> Read for Section<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = SliceReader::read_at(&*self, self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: SliceReader> Seek for Section<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl<R> fmt::Debug for Section<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn slice_read_at_is_limited() {
        let data = b"hello world".to_vec();
        let mut buf = [0u8; 8];
        assert_eq!(data.read_at(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"world");
        assert_eq!(data.read_at(11, &mut buf).unwrap(), 0);
        assert_eq!(data.read_at(100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_exact_at_reports_eof() {
        let data = b"abc".to_vec();
        let mut buf = [0u8; 4];
        let err = data.read_exact_at(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn section_is_bounded() {
        let data: SharedReader = Arc::new(b"0123456789".to_vec());
        let section = Section::new(data, 2, 5);
        let mut buf = [0u8; 10];
        assert_eq!(section.read_at(0, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"23456");
        assert_eq!(section.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(section.read_at(5, &mut buf).unwrap(), 0);
    }

    #[test]
    fn section_read_and_seek() {
        let mut section = Section::full(b"hello world".to_vec()).unwrap();
        let mut out = String::new();
        section.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");

        section.seek(SeekFrom::End(-5)).unwrap();
        out.clear();
        section.read_to_string(&mut out).unwrap();
        assert_eq!(out, "world");

        section.rewind().unwrap();
        assert_eq!(section.position(), 0);
        assert!(section.seek(SeekFrom::Current(-1)).is_err());
    }

    #[test]
    fn cloned_sections_have_independent_cursors() {
        let data: SharedReader = Arc::new(b"abcdef".to_vec());
        let mut a = Section::new(data, 0, 6);
        let mut b = a.clone();
        let mut buf = [0u8; 3];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"def");
        assert_eq!(a.rewound().position(), 0);
    }

    #[test]
    fn sub_section_bounds_are_checked() {
        let data: SharedReader = Arc::new(b"0123456789".to_vec());
        let outer = Section::new(data, 2, 6);
        let inner = outer.sub(1, 3).unwrap();
        assert_eq!(inner.read_to_vec().unwrap(), b"345");
        assert!(outer.sub(4, 3).is_err());
        assert!(outer.sub(u64::MAX, 2).is_err());
    }

    #[test]
    fn file_read_at() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"positional file data").unwrap();
        file.flush().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(SliceReader::read_at(&file, 11, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"file");
        assert_eq!(SliceReader::len(&file).unwrap(), 20);
    }
}
