//! Big-endian framing primitives shared by the writer and the reader

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CacheError, Corruption, Result};

/// Append-only encoder over an in-memory buffer
#[derive(Debug, Default)]
pub(crate) struct CacheWriter {
    buf: Vec<u8>,
}

impl CacheWriter {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    #[inline]
    pub(crate) fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    #[inline]
    pub(crate) fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub(crate) fn write_u16(&mut self, value: u16) {
        let mut bytes = [0; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        let mut bytes = [0; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    /// Signed values travel as their two's-complement `u32` image
    #[inline]
    pub(crate) fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub(crate) fn write_u64(&mut self, value: u64) {
        let mut bytes = [0; 8];
        BigEndian::write_u64(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    /// Length prefix; sizes beyond `u32` cannot be represented by the format
    pub(crate) fn write_len(&mut self, len: usize, what: &str) {
        let len = u32::try_from(len)
            .unwrap_or_else(|_| panic!("{what} of {len} exceeds the cache format's u32 limit"));
        self.write_u32(len);
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_len(bytes.len(), "byte string");
        self.buf.extend_from_slice(bytes);
    }

    #[inline]
    pub(crate) fn write_str(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    pub(crate) fn write_int_array(&mut self, values: &[u32]) {
        self.write_len(values.len(), "int array");
        for &value in values {
            self.write_u32(value);
        }
    }
}

/// Bounds-checked decoder over a borrowed buffer
///
/// Every length or count prefix is checked against the remaining input
/// before anything is allocated for it.
#[derive(Debug)]
pub(crate) struct CacheReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> CacheReader<'a> {
    /// Start decoding `data` at `offset`
    pub(crate) fn at(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            offset: offset.min(data.len()),
        }
    }

    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub(crate) fn corrupt(&self, reason: Corruption) -> CacheError {
        CacheError::corrupt(self.offset, reason)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.corrupt(Corruption::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            }));
        }
        let bytes = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool> {
        let at = self.offset;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CacheError::corrupt(at, Corruption::InvalidBool(other))),
        }
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    #[inline]
    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    /// Read a count prefix whose items occupy at least `min_item_size` bytes
    pub(crate) fn read_count(&mut self, min_item_size: usize) -> Result<usize> {
        let at = self.offset;
        let count = self.read_u32()? as usize;
        let declared = count as u64 * min_item_size as u64;
        if declared > self.remaining() as u64 {
            return Err(CacheError::corrupt(
                at,
                Corruption::LengthOverflow {
                    declared,
                    remaining: self.remaining(),
                },
            ));
        }
        Ok(count)
    }

    pub(crate) fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_count(1)?;
        self.take(len)
    }

    pub(crate) fn read_str(&mut self) -> Result<&'a str> {
        let at = self.offset;
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| CacheError::corrupt(at, Corruption::InvalidUtf8))
    }

    pub(crate) fn read_int_array(&mut self) -> Result<Vec<u32>> {
        let count = self.read_count(4)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_u32()?);
        }
        Ok(values)
    }

    /// Fail if anything is left after the last field
    pub(crate) fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(self.corrupt(Corruption::TrailingBytes(extra))),
        }
    }
}
