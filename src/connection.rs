// ABOUTME: Buffered frame-at-a-time I/O over any AsyncRead/AsyncWrite transport
// ABOUTME: Wraps a byte stream with read_frame/write_frame and close semantics

use crate::frame::{CodecError, Frame, HEADER_LEN};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Any transport this crate can speak frames over. Blanket-implemented for
/// every type satisfying the bound, the same way `tokio::io::split` is
/// generic over any `AsyncRead + AsyncWrite` — this is what lets the
/// session pump be exercised with `tokio::io::duplex` in tests instead of
/// only real `TcpStream`s.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Transport for T {}

/// Read half of a framed connection.
///
/// Buffers raw bytes off the wire and assembles them into [`Frame`]s. Any
/// data left over after a frame has been parsed is kept for the next call.
pub struct FrameReader<R> {
    stream: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        FrameReader {
            stream,
            // Most Terraria packets are well under 1KB; this avoids
            // reallocating on every session while staying small per-socket.
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Read a single frame from the underlying stream.
    ///
    /// Waits until enough data has been buffered to parse a complete frame.
    /// A header whose declared length is `< 3` fails with
    /// [`CodecError::BadLength`]. The stream ending before a complete frame
    /// arrives — whether mid-header or mid-payload — fails with
    /// [`CodecError::EndOfInput`]; both terminate the calling pump loop.
    pub async fn read_frame(&mut self) -> Result<Frame, CodecError> {
        loop {
            if let Some(frame) = self.try_parse()? {
                return Ok(frame);
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return Err(CodecError::EndOfInput);
            }
        }
    }

    fn try_parse(&mut self) -> Result<Option<Frame>, CodecError> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = u16::from_le_bytes([self.buffer[0], self.buffer[1]]) as usize;
        if len < HEADER_LEN {
            return Err(CodecError::BadLength { length: len as u16 });
        }
        if self.buffer.len() < len {
            return Ok(None);
        }

        let frame = Frame::from_buffered(&self.buffer[..len])?;
        self.buffer.advance(len);
        Ok(Some(frame))
    }
}

/// Write half of a framed connection.
pub struct FrameWriter<W> {
    stream: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W) -> Self {
        FrameWriter { stream }
    }

    /// Write a single frame. The transport may split the write into
    /// multiple syscalls, but this does not artificially fragment it.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), CodecError> {
        self.stream.write_all(frame.bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shut down the write half, signalling EOF to the peer.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameWriter as Builder;

    #[tokio::test]
    async fn read_frame_rejects_short_length() {
        let data = [0x02u8, 0x00];
        let mut reader = FrameReader::new(std::io::Cursor::new(&data[..]));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, CodecError::BadLength { length: 2 }));
    }

    #[tokio::test]
    async fn read_frame_rejects_short_payload() {
        let data = [0x0Au8, 0x00, 0x01, 0x00, 0x00, 0x00];
        let mut reader = FrameReader::new(std::io::Cursor::new(&data[..]));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, CodecError::EndOfInput));
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let (client, server) = tokio::io::duplex(4096);
        let mut w = FrameWriter::new(client);
        let mut r = FrameReader::new(server);

        let mut builder = Builder::new();
        builder.put_string("Terraria123");
        let frame = builder.finish(1).unwrap();

        w.write_frame(&frame).await.unwrap();
        let received = r.read_frame().await.unwrap();
        assert_eq!(received, frame);
    }

    #[tokio::test]
    async fn clean_close_before_any_bytes_is_end_of_input() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut r = FrameReader::new(server);
        assert!(matches!(
            r.read_frame().await,
            Err(CodecError::EndOfInput)
        ));
    }
}
