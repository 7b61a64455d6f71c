//! FLAP framing
//!
//! Wire layout (big-endian):
//!   [0] 0x2a marker  [1] frame type  [2..4] sequence  [4..6] payload length
//! followed by exactly `length` payload bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{self, MAX_PAYLOAD};
use crate::error::{OscarError, Result};

pub const FLAP_MARKER: u8 = 0x2a;
pub const FLAP_HEADER_LEN: usize = 6;

/// The version word carried at the start of every signon (channel 1) frame.
pub const FLAP_VERSION: u32 = 0x0000_0001;

/// FLAP channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Signon / connection acknowledgement (channel 1)
    Signon = 0x01,
    /// SNAC data (channel 2)
    Data = 0x02,
    /// FLAP-level error (channel 3)
    Error = 0x03,
    /// Signoff / close (channel 4)
    Signoff = 0x04,
    /// Keepalive (channel 5)
    Keepalive = 0x05,
}

impl TryFrom<u8> for FrameType {
    type Error = OscarError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(FrameType::Signon),
            0x02 => Ok(FrameType::Data),
            0x03 => Ok(FrameType::Error),
            0x04 => Ok(FrameType::Signoff),
            0x05 => Ok(FrameType::Keepalive),
            other => Err(OscarError::protocol(format!(
                "unknown FLAP frame type 0x{:02x}",
                other
            ))),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

/// One FLAP unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub sequence: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, sequence: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            sequence,
            payload: payload.into(),
        }
    }
}

/// A validated FLAP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlapHeader {
    pub frame_type: FrameType,
    pub sequence: u16,
    pub length: u16,
}

/// Validates the marker and channel of a 6-byte header.
///
/// A bad marker is not recoverable: FLAP has no resync point, so the caller
/// must drop the connection.
pub fn decode_header(header: &[u8]) -> Result<FlapHeader> {
    if header.len() < FLAP_HEADER_LEN {
        return Err(OscarError::TruncatedData {
            need: FLAP_HEADER_LEN,
            have: header.len(),
        });
    }
    if header[0] != FLAP_MARKER {
        return Err(OscarError::protocol(format!(
            "expected 0x2a FLAP marker, got 0x{:02x}",
            header[0]
        )));
    }
    Ok(FlapHeader {
        frame_type: FrameType::try_from(header[1])?,
        sequence: codec::get16(header, 2)?,
        length: codec::get16(header, 4)?,
    })
}

/// Encodes header and payload into one contiguous buffer.
pub fn encode(frame: &Frame) -> Result<Bytes> {
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(OscarError::PayloadTooLarge {
            len: frame.payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    let mut buf = BytesMut::with_capacity(FLAP_HEADER_LEN + frame.payload.len());
    buf.put_u8(FLAP_MARKER);
    buf.put_u8(frame.frame_type.into());
    buf.put_u16(frame.sequence);
    buf.put_u16(frame.payload.len() as u16);
    buf.put_slice(&frame.payload);
    Ok(buf.freeze())
}

/// Decodes one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it occupied. An incomplete frame
/// is [`OscarError::TruncatedData`]; the caller keeps the bytes and waits.
pub fn decode(buf: &[u8]) -> Result<(Frame, usize)> {
    let header = decode_header(buf)?;
    let total = FLAP_HEADER_LEN + header.length as usize;
    if buf.len() < total {
        return Err(OscarError::TruncatedData {
            need: total,
            have: buf.len(),
        });
    }
    let payload = Bytes::copy_from_slice(&buf[FLAP_HEADER_LEN..total]);
    Ok((Frame::new(header.frame_type, header.sequence, payload), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_layout() {
        let frame = Frame::new(FrameType::Data, 0x1234, vec![0xaa, 0xbb, 0xcc]);
        let bytes = encode(&frame).unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[0x2a, 0x02, 0x12, 0x34, 0x00, 0x03, 0xaa, 0xbb, 0xcc]
        );
    }

    #[test]
    fn test_decode_round_trip() {
        for ft in [
            FrameType::Signon,
            FrameType::Data,
            FrameType::Error,
            FrameType::Signoff,
            FrameType::Keepalive,
        ] {
            let frame = Frame::new(ft, 7, vec![1, 2, 3, 4]);
            let bytes = encode(&frame).unwrap();
            let (decoded, used) = decode(&bytes).unwrap();
            assert_eq!(decoded, frame);
            assert_eq!(used, bytes.len());
        }
    }

    #[test]
    fn test_empty_payload_frames() {
        let keepalive = Frame::new(FrameType::Keepalive, 1, Bytes::new());
        let bytes = encode(&keepalive).unwrap();
        assert_eq!(bytes.len(), FLAP_HEADER_LEN);
        assert_eq!(decode(&bytes).unwrap().0, keepalive);
    }

    #[test]
    fn test_bad_marker_is_protocol_error() {
        let bytes = [0x2b, 0x02, 0x00, 0x01, 0x00, 0x00];
        assert!(matches!(
            decode_header(&bytes),
            Err(OscarError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_unknown_frame_type_is_protocol_error() {
        let bytes = [0x2a, 0x09, 0x00, 0x01, 0x00, 0x00];
        assert!(matches!(decode(&bytes), Err(OscarError::ProtocolError(_))));
    }

    #[test]
    fn test_incomplete_frame_is_truncated() {
        let frame = Frame::new(FrameType::Data, 1, vec![0u8; 10]);
        let bytes = encode(&frame).unwrap();
        assert!(matches!(
            decode(&bytes[..8]),
            Err(OscarError::TruncatedData { need: 16, have: 8 })
        ));
        assert!(matches!(
            decode(&bytes[..3]),
            Err(OscarError::TruncatedData { need: 6, have: 3 })
        ));
    }

    #[test]
    fn test_full_payload_round_trips() {
        let payload: Vec<u8> = (0..MAX_PAYLOAD).map(|i| (i % 253) as u8).collect();
        let frame = Frame::new(FrameType::Data, 0x1234, payload);
        let bytes = encode(&frame).unwrap();
        assert_eq!(bytes.len(), FLAP_HEADER_LEN + MAX_PAYLOAD);
        assert_eq!(&bytes[4..6], &[0xff, 0xff]);
        let (decoded, used) = decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let frame = Frame::new(FrameType::Data, 1, vec![0u8; MAX_PAYLOAD + 1]);
        assert!(matches!(
            encode(&frame),
            Err(OscarError::PayloadTooLarge { .. })
        ));
    }
}
