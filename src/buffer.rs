//! # Node Buffer Codec
//!
//! Cursor-style writer and reader over an owned byte sequence. Every read is
//! bounds-checked, so a truncated or garbled blob surfaces as
//! [`EnsembleError::CorruptBuffer`] instead of reading past the end.
//!
//! Wire primitives (all integers little-endian):
//!
//! | Primitive | Layout |
//! |-----------|--------|
//! | `i32` | 4 bytes |
//! | `f64` | 8 bytes, IEEE 754 |
//! | string | `i32` byte length, then that many UTF-8 bytes, no terminator |

use crate::error::{EnsembleError, EnsembleResult};

/// Append-only writer producing a node blob
#[derive(Default, Debug)]
pub struct BufferWriter {
    inner: Vec<u8>,
}

impl BufferWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with a pre-allocated capacity
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Vec::with_capacity(cap),
        }
    }

    /// Append `value` as 4 little-endian bytes
    pub fn write_i32(&mut self, value: i32) {
        self.inner.extend_from_slice(&value.to_le_bytes());
    }

    /// Append `value` as 8 little-endian bytes
    pub fn write_f64(&mut self, value: f64) {
        self.inner.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-prefixed string
    ///
    /// The format cannot express more than `i32::MAX` bytes; longer strings
    /// are cut at that length.
    pub fn write_string(&mut self, value: &str) {
        let len = i32::try_from(value.len()).unwrap_or(i32::MAX);
        self.write_i32(len);
        self.inner.extend_from_slice(&value.as_bytes()[..len as usize]);
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Consume the writer and return the blob
    pub fn into_inner(self) -> Vec<u8> {
        self.inner
    }
}

/// Bounds-checked reader over a node blob
#[derive(Debug)]
pub struct BufferReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current cursor offset
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> EnsembleResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(EnsembleError::corrupt_buffer(format!(
                "need {n} bytes at offset {}, only {} available",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a little-endian `i32`; `CorruptBuffer` if fewer than 4 bytes remain
    pub fn read_i32(&mut self) -> EnsembleResult<i32> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(raw))
    }

    /// Read a little-endian `f64`; `CorruptBuffer` if fewer than 8 bytes remain
    pub fn read_f64(&mut self) -> EnsembleResult<f64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    /// Read a non-negative element count
    ///
    /// Rejects counts that could not possibly fit in the remaining bytes given
    /// the minimum encoded size of one element.
    pub fn read_count(&mut self, min_element_size: usize) -> EnsembleResult<usize> {
        let offset = self.pos;
        let count = self.read_i32()?;
        if count < 0 {
            return Err(EnsembleError::corrupt_buffer(format!(
                "negative count {count} at offset {offset}"
            )));
        }
        let count = count as usize;
        if count.saturating_mul(min_element_size) > self.remaining() {
            return Err(EnsembleError::corrupt_buffer(format!(
                "declared count {count} exceeds the {} bytes available",
                self.remaining()
            )));
        }
        Ok(count)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> EnsembleResult<String> {
        let offset = self.pos;
        let len = self.read_i32()?;
        if len < 0 {
            return Err(EnsembleError::corrupt_buffer(format!(
                "negative string length {len} at offset {offset}"
            )));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            EnsembleError::corrupt_buffer(format!("string at offset {offset} is not valid UTF-8"))
        })
    }

    /// Require that the whole buffer has been consumed
    pub fn finish(self) -> EnsembleResult<()> {
        if self.remaining() != 0 {
            return Err(EnsembleError::corrupt_buffer(format!(
                "{} trailing bytes after offset {}",
                self.remaining(),
                self.pos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_layout_is_length_prefixed() {
        let mut writer = BufferWriter::new();
        writer.write_string("abc");
        assert_eq!(writer.as_slice(), &[3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_read_back_primitives() {
        let mut writer = BufferWriter::with_capacity(32);
        writer.write_i32(-7);
        writer.write_f64(2.5);
        writer.write_string("");
        writer.write_string("WOPR");
        let blob = writer.into_inner();

        let mut reader = BufferReader::new(&blob);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_f64().unwrap(), 2.5);
        assert_eq!(reader.read_string().unwrap(), "");
        assert_eq!(reader.read_string().unwrap(), "WOPR");
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_truncated_int() {
        let mut reader = BufferReader::new(&[1, 0]);
        let err = reader.read_i32().unwrap_err();
        assert_eq!(err.category(), "corrupt_buffer");
    }

    #[test]
    fn test_length_prefix_overruns_buffer() {
        let mut writer = BufferWriter::new();
        writer.write_i32(100);
        writer.write_string("short");
        let blob = writer.into_inner();

        let mut reader = BufferReader::new(&blob[..]);
        // 100 is read as the string length here
        let err = reader.read_string().unwrap_err();
        assert!(matches!(err, EnsembleError::CorruptBuffer(_)));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut writer = BufferWriter::new();
        writer.write_i32(-1);
        let blob = writer.into_inner();
        let err = BufferReader::new(&blob).read_count(4).unwrap_err();
        assert!(err.message().contains("negative count"));
    }

    #[test]
    fn test_count_larger_than_buffer_rejected() {
        let mut writer = BufferWriter::new();
        writer.write_i32(3);
        writer.write_string("only-one");
        let blob = writer.into_inner();
        let mut reader = BufferReader::new(&blob);
        // three strings need at least 12 bytes of prefixes, 12 are available
        assert_eq!(reader.read_count(4).unwrap(), 3);

        let mut writer = BufferWriter::new();
        writer.write_i32(1000);
        let blob = writer.into_inner();
        assert!(BufferReader::new(&blob).read_count(4).is_err());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let blob = [2, 0, 0, 0, 0xff, 0xfe];
        let err = BufferReader::new(&blob).read_string().unwrap_err();
        assert!(err.message().contains("UTF-8"));
    }

    #[test]
    fn test_trailing_bytes_detected() {
        let blob = [0, 0, 0, 0, 9];
        let mut reader = BufferReader::new(&blob);
        reader.read_i32().unwrap();
        assert_eq!(reader.position(), 4);
        assert!(reader.finish().is_err());
    }
}
