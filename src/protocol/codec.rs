//! Async frame reading and writing over any byte stream.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::frame::{Frame, HEADER_LEN};

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the stream on a frame
/// boundary. A close in the middle of a frame is an `UnexpectedEof`.
pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> std::io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    if reader.read(&mut tag).await? == 0 {
        return Ok(None);
    }

    let len = reader.read_u32().await? as usize;
    if len > max_payload {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit of {}", len, max_payload),
        ));
    }

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame::new(tag[0], payload.freeze())))
}

/// Write one frame. The caller decides when to flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(HEADER_LEN + frame.payload.len());
    buf.put_u8(frame.tag);
    buf.put_u32(frame.payload.len() as u32);
    buf.extend_from_slice(&frame.payload);
    writer.write_all(&buf).await
}

/// Write several frames and flush once.
pub async fn write_frames<W>(writer: &mut W, frames: &[Frame]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for frame in frames {
        write_frame(writer, frame).await?;
    }
    writer.flush().await
}
