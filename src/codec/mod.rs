//! Byte codec
//!
//! Bounds-checked, big-endian ("network order") read and write primitives.
//! Every read past the end of input is a [`OscarError::TruncatedData`]; every
//! write past a writer's declared capacity is a [`OscarError::CapacityExceeded`].

pub mod tlv;

pub use tlv::{Tlv, TlvChain};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{OscarError, Result};

/// Largest payload a FLAP frame can carry (16-bit length field).
pub const MAX_PAYLOAD: usize = 0xffff;

/// Reads a big-endian u16 at `offset`.
pub fn get16(buf: &[u8], offset: usize) -> Result<u16> {
    let bytes = getstr(buf, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a big-endian u32 at `offset`.
pub fn get32(buf: &[u8], offset: usize) -> Result<u32> {
    let bytes = getstr(buf, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Borrows `len` raw bytes starting at `offset`.
pub fn getstr(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len).ok_or(OscarError::TruncatedData {
        need: len,
        have: buf.len().saturating_sub(offset),
    })?;
    if end > buf.len() {
        return Err(OscarError::TruncatedData {
            need: len,
            have: buf.len().saturating_sub(offset),
        });
    }
    Ok(&buf[offset..end])
}

/// Appends a big-endian u16.
pub fn put16(w: &mut ByteWriter, value: u16) -> Result<()> {
    w.put16(value)
}

/// Appends a big-endian u32.
pub fn put32(w: &mut ByteWriter, value: u32) -> Result<()> {
    w.put32(value)
}

/// Appends raw bytes.
pub fn putraw(w: &mut ByteWriter, bytes: &[u8]) -> Result<()> {
    w.putraw(bytes)
}

/// A cursor over a received byte slice.
#[derive(Debug, Clone)]
pub struct ByteStream<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteStream<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(OscarError::TruncatedData {
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn get8(&mut self) -> Result<u8> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn get16(&mut self) -> Result<u16> {
        let v = get16(self.buf, self.pos)?;
        self.pos += 2;
        Ok(v)
    }

    pub fn get32(&mut self) -> Result<u32> {
        let v = get32(self.buf, self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    /// Little-endian u16 (ICQ payloads).
    pub fn get_le16(&mut self) -> Result<u16> {
        let raw = self.getraw(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    /// Little-endian u32 (ICQ payloads).
    pub fn get_le32(&mut self) -> Result<u32> {
        let raw = self.getraw(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Borrows the next `len` bytes.
    pub fn getraw(&mut self, len: usize) -> Result<&'a [u8]> {
        self.need(len)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads `len` bytes as text. Invalid UTF-8 is replaced, not rejected;
    /// screen names and URLs on the wire are ASCII.
    pub fn getstr(&mut self, len: usize) -> Result<String> {
        let raw = self.getraw(len)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.need(len)?;
        self.pos += len;
        Ok(())
    }

    /// Splits off a sub-stream over the next `len` bytes and advances past them.
    pub fn split(&mut self, len: usize) -> Result<ByteStream<'a>> {
        let raw = self.getraw(len)?;
        Ok(ByteStream::new(raw))
    }
}

/// A growable output buffer with a hard capacity.
#[derive(Debug, Clone)]
pub struct ByteWriter {
    buf: BytesMut,
    capacity: usize,
}

impl ByteWriter {
    /// A writer that refuses to grow past `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity.min(MAX_PAYLOAD)),
            capacity,
        }
    }

    /// A writer bounded only by the FLAP payload limit.
    pub fn new() -> Self {
        Self::with_capacity(MAX_PAYLOAD)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buf.len()
    }

    fn reserve(&self, n: usize) -> Result<()> {
        if n > self.remaining_capacity() {
            return Err(OscarError::CapacityExceeded {
                requested: n,
                available: self.remaining_capacity(),
            });
        }
        Ok(())
    }

    pub fn put8(&mut self, value: u8) -> Result<()> {
        self.reserve(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn put16(&mut self, value: u16) -> Result<()> {
        self.reserve(2)?;
        self.buf.put_u16(value);
        Ok(())
    }

    pub fn put32(&mut self, value: u32) -> Result<()> {
        self.reserve(4)?;
        self.buf.put_u32(value);
        Ok(())
    }

    pub fn put_le16(&mut self, value: u16) -> Result<()> {
        self.reserve(2)?;
        self.buf.put_u16_le(value);
        Ok(())
    }

    pub fn put_le32(&mut self, value: u32) -> Result<()> {
        self.reserve(4)?;
        self.buf.put_u32_le(value);
        Ok(())
    }

    pub fn putraw(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn putstr(&mut self, s: &str) -> Result<()> {
        self.putraw(s.as_bytes())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}
