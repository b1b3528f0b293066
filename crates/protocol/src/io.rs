//! Async frame transport over any byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::HEADER_LEN;
use crate::error::WireError;
use crate::frame::{Frame, FrameHeader};

/// Writes a frame (header then payload) and flushes the writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), WireError> {
    writer.write_all(&frame.header.encode()).await?;
    if !frame.payload.is_empty() {
        writer.write_all(&frame.payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Reads a frame header.
///
/// A stream that closes before the first header byte yields
/// [`WireError::UnexpectedEof`]; one that closes part-way through is a
/// [`WireError::MalformedFrame`].
pub async fn read_frame_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_payload: u32,
) -> Result<FrameHeader, WireError> {
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(WireError::UnexpectedEof);
            }
            return Err(WireError::MalformedFrame(format!(
                "short read: {filled} of {HEADER_LEN} header bytes"
            )));
        }
        filled += n;
    }
    FrameHeader::decode(&buf, max_payload)
}

/// Reads a full frame whose payload length is taken from the header.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_payload: u32,
) -> Result<Frame, WireError> {
    let header = read_frame_header(reader, max_payload).await?;
    let mut payload = vec![0u8; header.payload_size as usize];
    if let Err(e) = reader.read_exact(&mut payload).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(WireError::MalformedFrame(format!(
                "truncated payload: expected {} bytes",
                header.payload_size
            )));
        }
        return Err(e.into());
    }
    Ok(Frame { header, payload })
}
