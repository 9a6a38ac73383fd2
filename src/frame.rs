// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;
use std::str;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

// Upper bound for pre-allocating array elements, a peer could announce any length.
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

// Commands are flat arrays. Deeper nesting only serves to exhaust the stack.
const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, ThisError, PartialEq)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("unsupported frame data type '{}'", char::from(*.0))]
    Unsupported(u8),
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Parses a single frame starting at the cursor position. On success the cursor is left right
    /// after the frame, on `Error::Incomplete` its position is unspecified and the caller is
    /// expected to retry from the start once more data is buffered.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_nested(src, 0)
    }

    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => Ok(Frame::Simple(get_line_string(src)?)),
            DataType::SimpleError => Ok(Frame::Error(get_line_string(src)?)),
            DataType::Integer => Ok(Frame::Integer(get_integer(src)?)),
            // $<length>\r\n<data>\r\n
            DataType::BulkString => match get_length(src)? {
                Some(length) => Ok(Frame::Bulk(get_exact(src, length)?)),
                None => Ok(Frame::Null),
            },
            // !<length>\r\n<error>\r\n
            DataType::BulkError => match get_length(src)? {
                Some(length) => {
                    let msg = get_exact(src, length)?;
                    let msg = str::from_utf8(&msg).map_err(|_| invalid_encoding())?;
                    Ok(Frame::Error(msg.to_string()))
                }
                // NOTE: the protocol does not specify a way to represent a null bulk error
                None => Ok(Frame::Null),
            },
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => match get_length(src)? {
                Some(_) if depth >= MAX_NESTING_DEPTH => {
                    Err(Error::Invalid("nested too deep".to_string()))
                }
                Some(length) => {
                    let mut frames = Vec::with_capacity(length.min(MAX_PREALLOCATED_ELEMENTS));
                    for _ in 0..length {
                        frames.push(Self::parse_nested(src, depth + 1)?);
                    }
                    Ok(Frame::Array(frames))
                }
                None => Ok(Frame::Null),
            },
            DataType::Null => {
                if !get_line(src)?.is_empty() {
                    return Err(Error::Invalid("invalid null frame".to_string()));
                }
                Ok(Frame::Null)
            }
            _ => Err(Error::Unsupported(first_byte)),
        }
    }

    /// Appends the wire representation of the frame to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(u8::from(DataType::SimpleString));
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Error(s) => {
                dst.put_u8(u8::from(DataType::SimpleError));
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Integer(i) => {
                dst.put_u8(u8::from(DataType::Integer));
                dst.put_slice(i.to_string().as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Bulk(bytes) => {
                let length = bytes.len().to_string();
                dst.reserve(1 + length.len() + bytes.len() + 2 * CRLF.len());
                dst.put_u8(u8::from(DataType::BulkString));
                dst.put_slice(length.as_bytes());
                dst.put_slice(CRLF);
                dst.put_slice(bytes);
                dst.put_slice(CRLF);
            }
            // RESP2 clients only understand the null bulk string.
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(arr) => {
                dst.put_u8(u8::from(DataType::Array));
                dst.put_slice(arr.len().to_string().as_bytes());
                dst.put_slice(CRLF);
                for frame in arr {
                    frame.write_to(dst);
                }
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

/// Returns whether `byte` opens a RESP frame. Anything else starts an inline command.
pub fn is_type_marker(byte: u8) -> bool {
    DataType::try_from(byte).is_ok()
}

/// Returns the bytes up to the next CRLF, advancing the cursor past it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = buf[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_line_string(src: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let line = get_line(src)?;
    str::from_utf8(line)
        .map(|s| s.to_string())
        .map_err(|_| invalid_encoding())
}

fn get_integer(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_line(src)?;
    str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::Invalid("invalid integer".to_string()))
}

/// Reads a length header. `-1` is the RESP2 null marker and maps to `None`.
fn get_length(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, Error> {
    let invalid = || Error::Invalid("invalid length".to_string());

    let line = get_line(src)?;
    let length = str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(invalid)?;

    match length {
        -1 => Ok(None),
        n if n < 0 => Err(invalid()),
        n => usize::try_from(n).map(Some).map_err(|_| invalid()),
    }
}

/// Reads exactly `length` bytes followed by CRLF.
fn get_exact(src: &mut Cursor<&[u8]>, length: usize) -> Result<Bytes, Error> {
    let needed = length.checked_add(CRLF.len()).ok_or(Error::Incomplete)?;
    if src.remaining() < needed {
        return Err(Error::Incomplete);
    }

    let start = src.position() as usize;
    let data = &src.get_ref()[start..start + length];
    if &src.get_ref()[start + length..start + needed] != CRLF {
        // Leave the cursor where the terminator was expected, the data belongs to the bad line.
        src.advance(length);
        return Err(Error::Invalid("expected CRLF after bulk data".to_string()));
    }

    let data = Bytes::copy_from_slice(data);
    src.advance(needed);

    Ok(data)
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

fn invalid_encoding() -> Error {
    Error::Invalid("invalid frame format".to_string())
}

#[derive(Debug)]
enum DataType {
    SimpleString,   // '+'
    BulkString,     // '$'
    VerbatimString, // '='
    SimpleError,    // '-'
    BulkError,      // '!'
    Boolean,        // '#'
    Integer,        // ':'
    Double,         // ','
    BigNumber,      // '('
    Array,          // '*'
    Map,            // '%'
    Set,            // '~'
    Push,           // '>'
    Null,           // '_'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'!' => Ok(Self::BulkError),
            b'*' => Ok(Self::Array),
            b'_' => Ok(Self::Null),
            b'#' => Ok(Self::Boolean),
            b',' => Ok(Self::Double),
            b'(' => Ok(Self::BigNumber),
            b'=' => Ok(Self::VerbatimString),
            b'%' => Ok(Self::Map),
            b'~' => Ok(Self::Set),
            b'>' => Ok(Self::Push),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::BulkError => b'!',
            DataType::Array => b'*',
            DataType::Null => b'_',
            DataType::Boolean => b'#',
            DataType::Double => b',',
            DataType::BigNumber => b'(',
            DataType::VerbatimString => b'=',
            DataType::Map => b'%',
            DataType::Set => b'~',
            DataType::Push => b'>',
        }
    }
}
