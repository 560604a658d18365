use byteorder::{ByteOrder, LittleEndian};

use crate::protocol::errors::ProtocolError;

// ---- Primitive write helpers ---------------------------------------------

pub(crate) fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub(crate) fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Fixed-width text field: UTF-8, NUL padded, always NUL terminated.
/// Text longer than `width - 1` bytes is cut at the last char boundary that fits.
pub(crate) fn put_fixed_str(buf: &mut Vec<u8>, s: &str, width: usize) {
    let mut end = s.len().min(width.saturating_sub(1));
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.extend_from_slice(&s.as_bytes()[..end]);
    buf.resize(buf.len() + (width - end), 0);
}

// ---- Cursor for decoding --------------------------------------------------

#[derive(Debug)]
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, consumed: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() < len {
            return Err(ProtocolError::Truncated {
                expected: self.consumed + len,
                actual: self.consumed + self.buf.len(),
            });
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        self.consumed += len;
        Ok(head)
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub(crate) fn get_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub(crate) fn get_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(len)
    }

    /// Reads a fixed-width text field up to its first NUL. Invalid UTF-8 is replaced.
    pub(crate) fn get_fixed_str(&mut self, width: usize) -> Result<String, ProtocolError> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    pub(crate) fn rest(self) -> &'a [u8] {
        self.buf
    }
}
