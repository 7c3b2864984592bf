//! Seekable byte stream for random-access parsing.
//!
//! This module provides [`ByteStream`], a cursor over any `Read + Seek`
//! source. Unlike a slice reader it never assumes the whole input is in
//! memory, so it works the same over files, memory maps and `Cursor`s.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;
use zerocopy::FromBytes;

use crate::{Error, Result};

/// Read-ahead window used while scanning for a null terminator.
const SCAN_CHUNK: usize = 64;

/// A stateful cursor over a seekable, readable byte source.
///
/// Every read is exact: it either returns the requested number of bytes or
/// fails, and the cursor only ever moves past bytes that were actually
/// consumed.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use pod_common::ByteStream;
///
/// let data = b"POD5\x2a\x00\x00\x00name\0".to_vec();
/// let mut stream = ByteStream::new(Cursor::new(data));
///
/// assert_eq!(stream.read_fixed_string(3).unwrap(), "POD");
/// stream.seek(4).unwrap();
/// assert_eq!(stream.read_i32_le().unwrap(), 42);
/// assert_eq!(stream.read_null_terminated_string().unwrap(), "name");
/// assert_eq!(stream.tell().unwrap(), 13);
/// ```
#[derive(Debug)]
pub struct ByteStream<R> {
    inner: R,
}

impl<R: Read + Seek> ByteStream<R> {
    /// Wrap a byte source. The cursor stays wherever the source left it.
    #[inline]
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Get a reference to the underlying source.
    #[inline]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap the stream, returning the underlying source.
    #[inline]
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Seek to an absolute offset.
    ///
    /// Negative offsets are rejected before the source is touched.
    pub fn seek(&mut self, offset: i64) -> Result<u64> {
        trace!(offset, "seek");
        let target = u64::try_from(offset).map_err(|_| Error::SeekFailure {
            offset,
            source: io::Error::new(io::ErrorKind::InvalidInput, "negative offset"),
        })?;

        self.inner
            .seek(SeekFrom::Start(target))
            .map_err(|source| Error::SeekFailure { offset, source })
    }

    /// Get the current absolute offset.
    #[inline]
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Get the total length of the source. The cursor is left unchanged.
    pub fn stream_len(&mut self) -> Result<u64> {
        let position = self.tell()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        if position != len {
            self.inner.seek(SeekFrom::Start(position))?;
        }
        Ok(len)
    }

    /// Perform a single read into `buf`, returning how many bytes arrived.
    ///
    /// Returns `0` only at end of stream. Interrupted reads are retried.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Fill `buf` completely or fail with [`Error::UnexpectedEof`].
    pub fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_some(&mut buf[filled..])?;
            if n == 0 {
                let offset = self.tell()?.saturating_sub(filled as u64);
                return Err(Error::UnexpectedEof {
                    offset,
                    needed: buf.len(),
                    available: filled,
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Read exactly `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; count];
        self.read_exact_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact_into(&mut byte)?;
        Ok(byte[0])
    }

    /// Read four bytes as an opaque value.
    #[inline]
    pub fn read_raw4(&mut self) -> Result<[u8; 4]> {
        let mut bytes = [0u8; 4];
        self.read_exact_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a little-endian i32.
    #[inline]
    pub fn read_i32_le(&mut self) -> Result<i32> {
        self.read_raw4().map(|b| LittleEndian::read_i32(&b))
    }

    /// Read a string of a specific length.
    ///
    /// No charset validation happens: invalid UTF-8 sequences are replaced
    /// rather than rejected.
    pub fn read_fixed_string(&mut self, length: usize) -> Result<String> {
        let bytes = self.read_bytes(length)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read bytes up to, and excluding, the next `0x00`.
    ///
    /// The terminator is consumed. Read-ahead past it is given back, so the
    /// cursor ends up directly after the terminator.
    pub fn read_null_terminated_bytes(&mut self) -> Result<Vec<u8>> {
        let start = self.tell()?;
        let mut out = Vec::new();
        let mut chunk = [0u8; SCAN_CHUNK];

        loop {
            let n = self.read_some(&mut chunk)?;
            if n == 0 {
                return Err(Error::UnterminatedString {
                    offset: start,
                    scanned: out.len(),
                });
            }

            if let Some(pos) = memchr::memchr(0, &chunk[..n]) {
                out.extend_from_slice(&chunk[..pos]);
                if pos + 1 < n {
                    let end = start + out.len() as u64 + 1;
                    self.seek(end as i64)?;
                }
                return Ok(out);
            }

            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read a null-terminated string.
    pub fn read_null_terminated_string(&mut self) -> Result<String> {
        let bytes = self.read_null_terminated_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a fixed-layout struct using zerocopy.
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(&bytes)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", e))))
    }
}
