/*!
 A forward-only reader over the bytes of a serialization stream.

 All multi-byte numbers in the stream are big-endian.
*/

use crate::error::stream::{StreamError, StreamErrorKind};

/// Reads fixed-width and length-prefixed fields from a byte slice
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    /// The stream we want to read
    stream: &'a [u8],
    /// The current index we are at in the stream
    idx: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self { stream, idx: 0 }
    }

    /// The current offset into the stream
    pub fn position(&self) -> usize {
        self.idx
    }

    /// The number of bytes left to read
    pub fn remaining(&self) -> usize {
        self.stream.len().saturating_sub(self.idx)
    }

    /// Build an error located at the current position
    pub fn error(&self, kind: StreamErrorKind) -> StreamError {
        StreamError::new(self.idx, kind)
    }

    /// Look at the next byte without consuming it, or [`None`] at the end of the stream
    pub fn peek_byte(&self) -> Option<u8> {
        self.stream.get(self.idx).copied()
    }

    /// Read exactly `n` bytes from the stream
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8], StreamError> {
        let range = self
            .idx
            .checked_add(n)
            .and_then(|end| self.stream.get(self.idx..end))
            .ok_or_else(|| self.truncated(n as u64))?;
        self.idx += n;
        Ok(range)
    }

    /// Read a byte length that came from the stream, which may not fit in memory
    pub fn read_exact_u64(&mut self, n: u64) -> Result<&'a [u8], StreamError> {
        let n = usize::try_from(n).map_err(|_| self.truncated(n))?;
        self.read_exact(n)
    }

    /// Read `width` bytes (at most 8) as a big-endian unsigned integer
    pub fn read_be(&mut self, width: usize) -> Result<u64, StreamError> {
        if width > 8 {
            return Err(self.error(StreamErrorKind::UnsupportedFeature(format!(
                "{width} byte integers"
            ))));
        }
        Ok(self
            .read_exact(width)?
            .iter()
            .fold(0, |acc, byte| (acc << 8) | u64::from(*byte)))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut out = [0; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a string whose length is stored in the preceding 16 bits
    pub fn read_utf(&mut self) -> Result<&'a [u8], StreamError> {
        let length = self.read_u16()?;
        self.read_exact(usize::from(length))
    }

    /// Read a string whose length is stored in the preceding 64 bits
    pub fn read_long_utf(&mut self) -> Result<&'a [u8], StreamError> {
        let length = self.read_u64()?;
        self.read_exact_u64(length)
    }

    fn truncated(&self, needed: u64) -> StreamError {
        self.error(StreamErrorKind::TruncatedInput {
            needed,
            available: self.remaining(),
        })
    }
}
