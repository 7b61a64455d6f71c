//! TLV chains
//!
//! An ordered multimap of `type:u16 -> value`. Duplicate types are legal and
//! addressed by a 1-based occurrence index.

use bytes::Bytes;

use super::{ByteStream, ByteWriter, MAX_PAYLOAD};
use crate::error::{OscarError, Result};

/// Bytes of framing in front of every TLV value (type + length).
pub const TLV_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tlv_type: u16,
    pub value: Bytes,
}

impl Tlv {
    pub fn new(tlv_type: u16, value: impl Into<Bytes>) -> Self {
        Self {
            tlv_type,
            value: value.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.value.first().copied()
    }

    pub fn as_u16(&self) -> Option<u16> {
        super::get16(&self.value, 0).ok()
    }

    pub fn as_u32(&self) -> Option<u32> {
        super::get32(&self.value, 0).ok()
    }

    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvChain {
    tlvs: Vec<Tlv>,
}

impl TlvChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tlvs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tlvs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tlv> {
        self.tlvs.iter()
    }

    /// Appends a raw value, preserving insertion order.
    pub fn append(&mut self, tlv_type: u16, value: impl AsRef<[u8]>) -> Result<()> {
        let value = value.as_ref();
        if value.len() > MAX_PAYLOAD {
            return Err(OscarError::PayloadTooLarge {
                len: value.len(),
                max: MAX_PAYLOAD,
            });
        }
        self.tlvs.push(Tlv::new(tlv_type, Bytes::copy_from_slice(value)));
        Ok(())
    }

    pub fn append_u8(&mut self, tlv_type: u16, value: u8) -> Result<()> {
        self.append(tlv_type, [value])
    }

    pub fn append_u16(&mut self, tlv_type: u16, value: u16) -> Result<()> {
        self.append(tlv_type, value.to_be_bytes())
    }

    pub fn append_u32(&mut self, tlv_type: u16, value: u32) -> Result<()> {
        self.append(tlv_type, value.to_be_bytes())
    }

    pub fn append_empty(&mut self, tlv_type: u16) -> Result<()> {
        self.append(tlv_type, [0u8; 0])
    }

    /// Serializes `chain` and nests it as the value of one TLV.
    pub fn append_chain(&mut self, tlv_type: u16, chain: &TlvChain) -> Result<()> {
        let inner = chain.serialize()?;
        self.append(tlv_type, inner)
    }

    /// The `occurrence`-th TLV of `tlv_type`, counting from 1.
    pub fn find(&self, tlv_type: u16, occurrence: usize) -> Option<&Tlv> {
        if occurrence == 0 {
            return None;
        }
        self.tlvs
            .iter()
            .filter(|t| t.tlv_type == tlv_type)
            .nth(occurrence - 1)
    }

    pub fn contains(&self, tlv_type: u16) -> bool {
        self.find(tlv_type, 1).is_some()
    }

    pub fn count(&self, tlv_type: u16) -> usize {
        self.tlvs.iter().filter(|t| t.tlv_type == tlv_type).count()
    }

    /// Removes every TLV of `tlv_type`, returning how many were dropped.
    pub fn remove(&mut self, tlv_type: u16) -> usize {
        let before = self.tlvs.len();
        self.tlvs.retain(|t| t.tlv_type != tlv_type);
        before - self.tlvs.len()
    }

    pub fn get_raw(&self, tlv_type: u16, occurrence: usize) -> Option<&Bytes> {
        self.find(tlv_type, occurrence).map(|t| &t.value)
    }

    pub fn get_str(&self, tlv_type: u16, occurrence: usize) -> Option<String> {
        self.find(tlv_type, occurrence).map(Tlv::as_str)
    }

    pub fn get_u8(&self, tlv_type: u16, occurrence: usize) -> Option<u8> {
        self.find(tlv_type, occurrence).and_then(Tlv::as_u8)
    }

    pub fn get_u16(&self, tlv_type: u16, occurrence: usize) -> Option<u16> {
        self.find(tlv_type, occurrence).and_then(Tlv::as_u16)
    }

    pub fn get_u32(&self, tlv_type: u16, occurrence: usize) -> Option<u32> {
        self.find(tlv_type, occurrence).and_then(Tlv::as_u32)
    }

    /// Serialized size: `4 + value.len()` per entry.
    pub fn length(&self) -> usize {
        self.tlvs.iter().map(|t| TLV_HEADER_LEN + t.len()).sum()
    }

    /// Writes every TLV. A value too long for the 16-bit length field is
    /// [`OscarError::PayloadTooLarge`], whichever way the chain was built.
    pub fn write(&self, w: &mut ByteWriter) -> Result<()> {
        for tlv in &self.tlvs {
            let len = u16::try_from(tlv.len()).map_err(|_| OscarError::PayloadTooLarge {
                len: tlv.len(),
                max: MAX_PAYLOAD,
            })?;
            w.put16(tlv.tlv_type)?;
            w.put16(len)?;
            w.putraw(&tlv.value)?;
        }
        Ok(())
    }

    pub fn serialize(&self) -> Result<Bytes> {
        let mut w = ByteWriter::with_capacity(self.length());
        self.write(&mut w)?;
        Ok(w.into_bytes())
    }

    /// Parses a buffer that holds nothing but TLVs.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut bs = ByteStream::new(bytes);
        Self::read(&mut bs)
    }

    /// Reads TLVs until the stream is exhausted.
    pub fn read(bs: &mut ByteStream<'_>) -> Result<Self> {
        let mut chain = Self::new();
        while !bs.is_empty() {
            chain.tlvs.push(read_one(bs)?);
        }
        Ok(chain)
    }

    /// Reads exactly `num` TLVs.
    pub fn read_num(bs: &mut ByteStream<'_>, num: usize) -> Result<Self> {
        let mut chain = Self::new();
        for _ in 0..num {
            chain.tlvs.push(read_one(bs)?);
        }
        Ok(chain)
    }

    /// Reads TLVs from the next `len` bytes only.
    pub fn read_len(bs: &mut ByteStream<'_>, len: usize) -> Result<Self> {
        let mut sub = bs.split(len)?;
        Self::read(&mut sub)
    }
}

impl FromIterator<Tlv> for TlvChain {
    fn from_iter<I: IntoIterator<Item = Tlv>>(iter: I) -> Self {
        Self {
            tlvs: iter.into_iter().collect(),
        }
    }
}

fn read_one(bs: &mut ByteStream<'_>) -> Result<Tlv> {
    let tlv_type = bs.get16()?;
    let declared = bs.get16()? as usize;
    if declared > bs.remaining() {
        return Err(OscarError::TruncatedTlv {
            tlv_type,
            declared,
            remaining: bs.remaining(),
        });
    }
    let value = bs.getraw(declared)?;
    Ok(Tlv::new(tlv_type, Bytes::copy_from_slice(value)))
}
