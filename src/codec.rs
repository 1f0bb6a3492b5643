//! Byte codec for the OpenTimestamps wire format
//!
//! Two halves:
//! - [`SerializationContext`]: append-only byte sink
//! - [`DeserializationContext`]: strict cursor over a fixed buffer
//!
//! Varuints are LEB128: 7-bit little-endian groups, high bit set while more
//! bytes follow.

use thiserror::Error;

/// Low-level codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Not enough bytes left for the requested read
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    EndOfInput { needed: usize, remaining: usize },

    /// Decoded value is outside the range allowed for the field
    #[error("value error: {0}")]
    ValueError(String),

    /// Fixed header did not match
    #[error("bad magic bytes")]
    BadMagic,

    /// Input continues after the last expected field
    #[error("trailing garbage: {0} unread bytes")]
    TrailingGarbage(usize),
}

/// Codec result type alias
pub type CodecResult<T> = Result<T, CodecError>;

/// Append-only byte sink
#[derive(Debug, Clone, Default)]
pub struct SerializationContext {
    buf: Vec<u8>,
}

impl SerializationContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `0xff` for true, `0x00` for false
    pub fn write_bool(&mut self, value: bool) {
        self.write_byte(if value { 0xff } else { 0x00 });
    }

    pub fn write_varuint(&mut self, mut value: u64) {
        loop {
            let group = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(group);
                break;
            }
            self.buf.push(group | 0x80);
        }
    }

    pub fn write_byte(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    /// Varuint length prefix followed by the raw bytes
    pub fn write_varbytes(&mut self, value: &[u8]) {
        self.write_varuint(value.len() as u64);
        self.write_bytes(value);
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Cursor over a fixed input buffer
///
/// Every read either consumes exactly the requested bytes or fails; nothing
/// is clamped or padded.
#[derive(Debug, Clone)]
pub struct DeserializationContext<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DeserializationContext<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read exactly `len` bytes
    ///
    /// # Errors
    ///
    /// Returns `CodecError::EndOfInput` if fewer than `len` bytes remain
    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(CodecError::EndOfInput {
                needed: len,
                remaining,
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_byte(&mut self) -> CodecResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a bool written by [`SerializationContext::write_bool`]
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_byte()? {
            0xff => Ok(true),
            0x00 => Ok(false),
            other => Err(CodecError::ValueError(format!(
                "invalid bool byte {other:#04x}"
            ))),
        }
    }

    /// Read a LEB128 varuint
    ///
    /// # Errors
    ///
    /// Returns `CodecError::ValueError` if the value does not fit in a u64
    pub fn read_varuint(&mut self) -> CodecResult<u64> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;

        loop {
            let byte = self.read_byte()?;
            let group = u64::from(byte & 0x7f);

            if shift >= 64 || (group << shift) >> shift != group {
                return Err(CodecError::ValueError("varuint overflows u64".into()));
            }
            value |= group << shift;

            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a varuint length prefix and that many bytes
    ///
    /// # Errors
    ///
    /// Returns `CodecError::ValueError` if the length is outside
    /// `min_len..=max_len`, `CodecError::EndOfInput` if the bytes are missing
    pub fn read_varbytes(&mut self, max_len: usize, min_len: usize) -> CodecResult<&'a [u8]> {
        let len = self.read_varuint()?;
        let len = usize::try_from(len)
            .map_err(|_| CodecError::ValueError(format!("varbytes length {len} too large")))?;

        if len > max_len {
            return Err(CodecError::ValueError(format!(
                "varbytes length {len} exceeds maximum {max_len}"
            )));
        }
        if len < min_len {
            return Err(CodecError::ValueError(format!(
                "varbytes length {len} below minimum {min_len}"
            )));
        }

        self.read_bytes(len)
    }

    /// Consume `expected.len()` bytes and require them to equal `expected`
    pub fn assert_magic(&mut self, expected: &[u8]) -> CodecResult<()> {
        let actual = self.read_bytes(expected.len())?;
        if actual != expected {
            return Err(CodecError::BadMagic);
        }
        Ok(())
    }

    /// Require that all input was consumed
    pub fn assert_eof(&self) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingGarbage(n)),
        }
    }
}
