//! FLAP framing and async frame I/O over tokio streams

pub mod crypt;
pub mod flap;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{OscarError, Result};
use crate::session::Connection;

use flap::{Frame, FLAP_HEADER_LEN};

/// Read one FLAP frame from `stream`.
///
/// EOF before a complete header is [`OscarError::Io`]. EOF inside the
/// payload, a bad marker or an unknown channel is a protocol error and the
/// stream must be dropped.
pub async fn read_flap<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Frame> {
    let mut header = [0u8; FLAP_HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let hdr = flap::decode_header(&header)?;
    let mut payload = vec![0u8; hdr.length as usize];
    stream.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            OscarError::protocol(format!(
                "stream ended inside a {}-byte FLAP payload",
                hdr.length
            ))
        } else {
            OscarError::Io(e)
        }
    })?;
    Ok(Frame::new(hdr.frame_type, hdr.sequence, payload))
}

/// Write every queued frame of `conn` to `stream`, in order.
/// Returns the number of bytes written.
pub async fn write_pending<W: AsyncWrite + Unpin>(
    conn: &mut Connection,
    stream: &mut W,
) -> Result<usize> {
    let mut written = 0;
    for frame in conn.take_pending() {
        stream.write_all(&frame).await?;
        written += frame.len();
    }
    stream.flush().await?;
    Ok(written)
}
