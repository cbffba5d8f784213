//! Reson 7k data record protocol
//!
//! Pure decoding and encoding of 7k records: `&[u8]` → `Result<Record, CodecError>`
//! and back. No I/O happens here; callers hand in complete records (see
//! [`codec::decode`]) or push raw stream bytes into a [`codec::RecordFramer`].
//!
//! # Record layout
//!
//! ```text
//! +-------------------+  0
//! | header (64 bytes) |
//! +-------------------+  64
//! | record type data  |  fixed prefix + variable arrays
//! +-------------------+  optional data offset (when non-zero)
//! | optional data     |
//! +-------------------+  size - 4
//! | checksum (u32)    |
//! +-------------------+  size
//! ```
//!
//! All multi-byte fields are little-endian.

pub mod codec;
pub mod detection;
pub mod event;
pub mod header;
pub mod nav;
pub mod snippet;
pub mod sonar;

pub use codec::{decode, encode, FramerStats, Record, RecordFramer, RecordKind};
pub use header::{checksum, HeaderFlags, RecordHeader, RecordTime};

use crate::error::CodecError;

/// Extract a NUL terminated string from a fixed-width field
pub fn c_string(bytes: &[u8]) -> Option<String> {
    let null_pos = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..null_pos])
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Build a NUL padded fixed-width field from a string, truncating so at
/// least one terminating NUL remains
pub fn fixed_string(s: &str, width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    let len = s.len().min(width.saturating_sub(1));
    field[..len].copy_from_slice(&s.as_bytes()[..len]);
    field
}

// =============================================================================
// Little-endian cursor
// =============================================================================

/// Cursor over a record payload
///
/// Every read is bounds checked; array reads check the declared count against
/// the remaining bytes before allocating anything.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    record_type: u32,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], record_type: u32) -> Self {
        Self {
            data,
            pos: 0,
            record_type,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::TooShort {
                expected: self.pos + n,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    pub fn u32_array<const N: usize>(&mut self) -> Result<[u32; N], CodecError> {
        let mut out = [0u32; N];
        for v in out.iter_mut() {
            *v = self.u32()?;
        }
        Ok(out)
    }

    /// Fail with `CountOverflow` unless `count` items of `item_size` bytes fit
    pub fn check_count(&self, count: usize, item_size: usize) -> Result<(), CodecError> {
        match count.checked_mul(item_size) {
            Some(n) if n <= self.remaining() => Ok(()),
            _ => Err(CodecError::CountOverflow {
                record_type: self.record_type,
                count,
            }),
        }
    }

    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        self.check_count(n, 1)?;
        Ok(self.take(n)?.to_vec())
    }

    pub fn f32_vec(&mut self, count: usize) -> Result<Vec<f32>, CodecError> {
        self.check_count(count, 4)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.f32()?);
        }
        Ok(out)
    }

    pub fn u16_vec(&mut self, count: usize) -> Result<Vec<u16>, CodecError> {
        self.check_count(count, 2)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.u16()?);
        }
        Ok(out)
    }

    pub fn u32_vec(&mut self, count: usize) -> Result<Vec<u32>, CodecError> {
        self.check_count(count, 4)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.u32()?);
        }
        Ok(out)
    }

    /// Everything not yet consumed
    pub fn rest(&mut self) -> Vec<u8> {
        let out = self.data[self.pos..].to_vec();
        self.pos = self.data.len();
        out
    }

    pub fn invalid(&self, reason: impl Into<String>) -> CodecError {
        CodecError::InvalidField {
            record_type: self.record_type,
            reason: reason.into(),
        }
    }
}

/// Little-endian record writer
#[derive(Debug, Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Write exactly `width` bytes: `v` truncated or NUL padded
    pub fn fixed(&mut self, v: &[u8], width: usize) {
        let n = v.len().min(width);
        self.buf.extend_from_slice(&v[..n]);
        self.buf.resize(self.buf.len() + (width - n), 0);
    }

    pub fn u32_slice(&mut self, v: &[u32]) {
        for x in v {
            self.u32(*x);
        }
    }

    pub fn f32_slice(&mut self, v: &[f32]) {
        for x in v {
            self.f32(*x);
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Count from a payload field, as `usize`
pub(crate) fn count(v: impl Into<u64>) -> usize {
    usize::try_from(v.into()).unwrap_or(usize::MAX)
}

/// Count to a payload field; saturates on absurd lengths
pub(crate) fn len_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

pub(crate) fn len_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

pub(crate) fn len_u8(n: usize) -> u8 {
    u8::try_from(n).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_string() {
        assert_eq!(c_string(b"7k IO\0junk"), Some("7k IO".to_string()));
        assert_eq!(c_string(b"notes"), Some("notes".to_string()));
        assert_eq!(c_string(b"\0\0\0"), None);
    }

    #[test]
    fn test_fixed_string_keeps_terminator() {
        let f = fixed_string("abcdef", 4);
        assert_eq!(f, b"abc\0".to_vec());
        assert_eq!(fixed_string("ab", 4), b"ab\0\0".to_vec());
    }

    #[test]
    fn test_reader_bounds() {
        let data = [1u8, 0, 2, 0, 0, 0];
        let mut r = ByteReader::new(&data, 7000);
        assert_eq!(r.u16().unwrap(), 1);
        assert_eq!(r.u32().unwrap(), 2);
        assert!(matches!(r.u8(), Err(CodecError::TooShort { .. })));
    }

    #[test]
    fn test_count_overflow_before_allocation() {
        let data = [0u8; 8];
        let mut r = ByteReader::new(&data, 7006);
        assert_eq!(
            r.f32_vec(3),
            Err(CodecError::CountOverflow {
                record_type: 7006,
                count: 3
            })
        );
        assert!(r.f32_vec(usize::MAX).is_err());
        assert_eq!(r.f32_vec(2).unwrap().len(), 2);
    }

    #[test]
    fn test_writer_fixed() {
        let mut w = ByteWriter::default();
        w.fixed(b"abc", 5);
        w.fixed(b"abcdef", 2);
        assert_eq!(w.into_inner(), b"abc\0\0ab".to_vec());
    }
}
