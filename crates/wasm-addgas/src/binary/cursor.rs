//! Read position over an input byte slice.

use crate::error::{Error, Result};

/// Forward-only reader over a byte slice.
///
/// Positions are absolute: a cursor created with [`Cursor::sub`] keeps
/// reporting offsets relative to the start of the original input, so errors
/// raised deep inside a section still point at the right byte.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_base(bytes, 0)
    }

    /// Cursor over `bytes` whose first byte sits at absolute offset `base`.
    pub fn with_base(bytes: &'a [u8], base: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            base,
        }
    }

    /// Absolute offset of the next byte to be read.
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads exactly `n` bytes.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::UnexpectedEnd {
                offset: self.position(),
                wanted: n - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.read(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_var_u32(&mut self) -> Result<u32> {
        self.read_unsigned(32).map(|v| v as u32)
    }

    pub fn read_var_u64(&mut self) -> Result<u64> {
        self.read_unsigned(64)
    }

    pub fn read_var_i32(&mut self) -> Result<i32> {
        self.read_signed(32).map(|v| v as i32)
    }

    pub fn read_var_i64(&mut self) -> Result<i64> {
        self.read_signed(64)
    }

    /// Signed 33-bit integer, the encoding of block types that name a type
    /// index.
    pub fn read_var_s33(&mut self) -> Result<i64> {
        self.read_signed(33)
    }

    /// Length-prefixed byte vector (the encoding of names).
    pub fn read_bytes_vec(&mut self) -> Result<&'a [u8]> {
        let len = self.read_var_u32()? as usize;
        self.read(len)
    }

    /// Splits off the next `len` bytes into their own cursor.
    pub fn sub(&mut self, len: usize) -> Result<Cursor<'a>> {
        let base = self.position();
        let bytes = self.read(len)?;
        Ok(Cursor::with_base(bytes, base))
    }

    /// Everything not read yet, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn read_unsigned(&mut self, bits: u32) -> Result<u64> {
        let start = self.position();
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            let payload = u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                let usable = bits - shift;
                if usable < 7 && payload >> usable != 0 {
                    return Err(Error::InvalidLeb128 { offset: start });
                }
                result |= payload << shift;
                return Ok(result);
            }
            result |= payload << shift;
            shift += 7;
            if shift >= bits {
                return Err(Error::InvalidLeb128 { offset: start });
            }
        }
    }

    fn read_signed(&mut self, bits: u32) -> Result<i64> {
        let start = self.position();
        let mut result = 0i64;
        let mut shift = 0u32;
        let mut byte;
        loop {
            byte = self.read_u8()?;
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
            if shift >= bits {
                return Err(Error::InvalidLeb128 { offset: start });
            }
        }
        if shift > bits {
            // The last byte carries bits past the target width; they must all
            // repeat the sign bit.
            let unused = shift - bits;
            let top = (byte & 0x7f) >> (6 - unused);
            let all_ones = (1u8 << (unused + 1)) - 1;
            if top != 0 && top != all_ones {
                return Err(Error::InvalidLeb128 { offset: start });
            }
        }
        if shift < 64 && byte & 0x40 != 0 {
            result |= !0i64 << shift;
        }
        Ok(result)
    }
}
