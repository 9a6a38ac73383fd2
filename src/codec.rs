use bytes::{Buf, Bytes, BytesMut};
use std::io::{self, Cursor};
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

#[derive(Debug, ThisError)]
pub enum CodecError {
    /// The buffered bytes are not a valid frame. The offending line has been discarded and the
    /// stream can keep going.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// A single frame outgrew the read buffer limit. There is no way to resynchronise.
    #[error("Protocol error: frame size exceeds limit of {limit} bytes")]
    FrameTooLarge { limit: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Whether the stream must be abandoned after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CodecError::Protocol(_))
    }

    /// The reply that tells the peer what went wrong, if the peer can still be written to.
    pub fn to_reply(&self) -> Option<Frame> {
        match self {
            CodecError::Io(_) => None,
            err => Some(Frame::Error(format!("ERR {}", err))),
        }
    }
}

/// Decodes client requests and encodes replies. Requests are either RESP frames or inline
/// commands, i.e. a plain line of whitespace separated words as typed in a telnet session.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> FrameCodec {
        FrameCodec { max_frame_size }
    }

    fn check_size(&self, src: &mut BytesMut) -> Result<(), CodecError> {
        if src.len() > self.max_frame_size {
            src.clear();
            return Err(CodecError::FrameTooLarge {
                limit: self.max_frame_size,
            });
        }
        Ok(())
    }

    fn decode_inline(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        let Some(end) = src.iter().position(|b| *b == b'\n') else {
            self.check_size(src)?;
            return Ok(None);
        };

        let line = src.split_to(end + 1);
        let words = line[..end]
            .split(|b| b.is_ascii_whitespace())
            .filter(|word| !word.is_empty())
            .map(|word| Frame::Bulk(Bytes::copy_from_slice(word)))
            .collect();

        Ok(Some(Frame::Array(words)))
    }
}

/// Drops blank lines at the front of the buffer, same as Redis does. Whitespace before a partial
/// line is kept until the line is complete.
fn skip_blank_lines(src: &mut BytesMut) {
    let leading = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
    if let Some(end) = src[..leading].iter().rposition(|b| *b == b'\n') {
        src.advance(end + 1);
    }
}

/// Where to resume after a malformed frame: right after the line the parser choked on. Whatever
/// the peer pipelined behind it is left in place.
fn resync_point(buf: &[u8], position: usize) -> usize {
    if position > 0 && buf[position - 1] == b'\n' {
        return position;
    }

    buf[position..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(buf.len(), |index| position + index + 1)
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        skip_blank_lines(src);

        let Some(&first_byte) = src.first() else {
            return Ok(None);
        };

        if !frame::is_type_marker(first_byte) {
            return self.decode_inline(src);
        }

        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            // Not enough data to parse a frame.
            Err(frame::Error::Incomplete) => {
                self.check_size(src)?;
                return Ok(None);
            }
            Err(err) => {
                let position = resync_point(src, cursor.position() as usize);
                src.advance(position);
                return Err(CodecError::Protocol(err.to_string()));
            }
        };

        // Remove the parsed frame from the buffer.
        let position = cursor.position() as usize;
        src.advance(position);

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}
