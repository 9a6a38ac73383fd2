use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{CodecError, FrameCodec};
use crate::frame::Frame;

/// A framed client stream. Reads go through a growable buffer that is fed to the codec, writes are
/// buffered and only reach the peer on `flush`.
pub struct Connection<S> {
    stream: BufWriter<S>,
    // Data is read from the socket into the read buffer. When a frame is parsed, the corresponding
    // data is removed from the buffer.
    buffer: BytesMut,
    // Scratch space for encoding a single reply.
    encoded: BytesMut,
    codec: FrameCodec,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, codec: FrameCodec) -> Connection<S> {
        Connection {
            stream: BufWriter::new(stream),
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
            encoded: BytesMut::new(),
            codec,
        }
    }

    /// Reads the next frame. Returns `Ok(None)` when the peer closed the stream cleanly, that is,
    /// without leaving half a frame behind.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection reset by peer in the middle of a frame",
                )
                .into());
            }
        }
    }

    /// Whether every byte received so far has been consumed, meaning the frame just read was the
    /// last one of the batch the peer pipelined.
    pub fn is_batch_drained(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether there are replies waiting for a flush.
    pub fn has_pending_output(&self) -> bool {
        !self.stream.buffer().is_empty()
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), CodecError> {
        self.encoded.clear();
        self.codec.encode(frame, &mut self.encoded)?;
        self.stream.write_all(&self.encoded).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }
}
