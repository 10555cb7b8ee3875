// src/core/protocol/resp_frame.rs

//! RESP frames as exchanged with the store, plus the `tokio_util` codec used by
//! every store link.

use crate::core::errors::RedisError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

// Caps on what a peer may ask us to buffer.
const MAX_ARRAY_LEN: usize = 1_024 * 1_024;
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
const MAX_NESTING: usize = 64;

/// A single RESP value, either a request we send or a reply we receive.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Builds a request frame: an array of bulk strings, command name first.
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        RespFrame::Array(
            args.into_iter()
                .map(|a| RespFrame::BulkString(Bytes::copy_from_slice(a.as_ref())))
                .collect(),
        )
    }

    /// Short name of the frame kind, used in reply-shape diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RespFrame::SimpleString(_) => "simple-string",
            RespFrame::Error(_) => "error",
            RespFrame::Integer(_) => "integer",
            RespFrame::BulkString(_) => "bulk-string",
            RespFrame::Null => "nil",
            RespFrame::NullArray => "nil-array",
            RespFrame::Array(_) => "array",
        }
    }

    /// Renders a string-like frame as text. Integers are rendered in decimal.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespFrame::SimpleString(s) => Some(s.clone()),
            RespFrame::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
            RespFrame::Integer(i) => Some(itoa::Buffer::new().format(*i).to_string()),
            _ => None,
        }
    }
}

/// Stateless RESP encoder/decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = RedisError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_frame(&item, dst);
        Ok(())
    }
}

fn write_frame(frame: &RespFrame, dst: &mut BytesMut) {
    let mut num = itoa::Buffer::new();
    match frame {
        RespFrame::SimpleString(s) => write_line(dst, b'+', s.as_bytes()),
        RespFrame::Error(s) => write_line(dst, b'-', s.as_bytes()),
        RespFrame::Integer(i) => write_line(dst, b':', num.format(*i).as_bytes()),
        RespFrame::BulkString(b) => {
            write_line(dst, b'$', num.format(b.len()).as_bytes());
            dst.extend_from_slice(b);
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
        RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
        RespFrame::Array(items) => {
            write_line(dst, b'*', num.format(items.len()).as_bytes());
            for item in items {
                write_frame(item, dst);
            }
        }
    }
}

fn write_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.reserve(body.len() + 3);
    dst.extend_from_slice(&[prefix]);
    dst.extend_from_slice(body);
    dst.extend_from_slice(CRLF);
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = RedisError;

    /// Decodes one complete frame, leaving the buffer untouched when more bytes are needed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let mut pos = 0;
        match read_frame(src, &mut pos, 0) {
            Ok(frame) => {
                src.advance(pos);
                Ok(Some(frame))
            }
            Err(RedisError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Reads the frame starting at `*pos`, advancing `*pos` past it on success.
fn read_frame(buf: &[u8], pos: &mut usize, depth: usize) -> Result<RespFrame, RedisError> {
    if depth > MAX_NESTING {
        return Err(RedisError::Protocol("frame nesting too deep".to_string()));
    }
    let Some(&prefix) = buf.get(*pos) else {
        return Err(RedisError::IncompleteData);
    };
    *pos += 1;
    match prefix {
        b'+' => Ok(RespFrame::SimpleString(read_text(buf, pos)?)),
        b'-' => Ok(RespFrame::Error(read_text(buf, pos)?)),
        b':' => Ok(RespFrame::Integer(read_number(buf, pos)?)),
        b'$' => {
            let len = read_number(buf, pos)?;
            if len == -1 {
                return Ok(RespFrame::Null);
            }
            let len = checked_len(len, MAX_BULK_LEN, "bulk string")?;
            let end = *pos + len;
            if buf.len() < end + CRLF.len() {
                return Err(RedisError::IncompleteData);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(RedisError::Protocol(
                    "bulk string not terminated by CRLF".to_string(),
                ));
            }
            let data = Bytes::copy_from_slice(&buf[*pos..end]);
            *pos = end + CRLF.len();
            Ok(RespFrame::BulkString(data))
        }
        b'*' => {
            let len = read_number(buf, pos)?;
            if len == -1 {
                return Ok(RespFrame::NullArray);
            }
            let len = checked_len(len, MAX_ARRAY_LEN, "array")?;
            let mut items = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                items.push(read_frame(buf, pos, depth + 1)?);
            }
            Ok(RespFrame::Array(items))
        }
        other => Err(RedisError::Protocol(format!(
            "unexpected frame prefix byte 0x{other:02x}"
        ))),
    }
}

fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], RedisError> {
    let rest = &buf[*pos..];
    let Some(idx) = rest.windows(CRLF.len()).position(|w| w == CRLF) else {
        return Err(RedisError::IncompleteData);
    };
    *pos += idx + CRLF.len();
    Ok(&rest[..idx])
}

fn read_text(buf: &[u8], pos: &mut usize) -> Result<String, RedisError> {
    read_line(buf, pos).map(|line| String::from_utf8_lossy(line).into_owned())
}

fn read_number(buf: &[u8], pos: &mut usize) -> Result<i64, RedisError> {
    let line = read_line(buf, pos)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            RedisError::Protocol(format!(
                "invalid length or integer '{}'",
                String::from_utf8_lossy(line)
            ))
        })
}

fn checked_len(len: i64, max: usize, what: &str) -> Result<usize, RedisError> {
    usize::try_from(len)
        .ok()
        .filter(|&l| l <= max)
        .ok_or_else(|| RedisError::Protocol(format!("{what} length {len} out of range")))
}
