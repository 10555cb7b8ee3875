// src/core/protocol/reply.rs

//! Reply-shape validation and typed decoding of reply payloads.

use super::RespFrame;
use crate::core::errors::{RedisError, Result};
use bytes::Bytes;
use tracing::warn;

/// Shape checks applied to a reply before its value is handed to the caller.
///
/// An error reply always becomes `BadReply`; a nil reply where data was expected
/// becomes `NoReply`; any other mismatch becomes `BadReply`.
pub trait ReplyExt: Sized {
    /// Passes any non-error reply through.
    fn into_result(self) -> Result<RespFrame>;
    /// Expects a status reply such as `+OK`.
    fn expect_status(self) -> Result<String>;
    fn expect_bulk(self) -> Result<Bytes>;
    fn expect_integer(self) -> Result<i64>;
    fn expect_array(self) -> Result<Vec<RespFrame>>;
}

impl ReplyExt for RespFrame {
    fn into_result(self) -> Result<RespFrame> {
        match self {
            RespFrame::Error(msg) => Err(RedisError::BadReply(msg)),
            other => Ok(other),
        }
    }

    fn expect_status(self) -> Result<String> {
        match self.into_result()? {
            RespFrame::SimpleString(s) => Ok(s),
            RespFrame::Null | RespFrame::NullArray => Err(RedisError::NoReply),
            other => Err(unexpected("status", &other)),
        }
    }

    fn expect_bulk(self) -> Result<Bytes> {
        match self.into_result()? {
            RespFrame::BulkString(b) => Ok(b),
            RespFrame::Null | RespFrame::NullArray => Err(RedisError::NoReply),
            other => Err(unexpected("bulk-string", &other)),
        }
    }

    fn expect_integer(self) -> Result<i64> {
        match self.into_result()? {
            RespFrame::Integer(i) => Ok(i),
            RespFrame::Null | RespFrame::NullArray => Err(RedisError::NoReply),
            other => Err(unexpected("integer", &other)),
        }
    }

    fn expect_array(self) -> Result<Vec<RespFrame>> {
        match self.into_result()? {
            RespFrame::Array(items) => Ok(items),
            RespFrame::Null | RespFrame::NullArray => Err(RedisError::NoReply),
            other => Err(unexpected("array", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &RespFrame) -> RedisError {
    RedisError::BadReply(format!("expected {wanted} reply, got {}", got.kind()))
}

/// Decodes an integer payload. Unparsable text decodes to zero, which callers
/// cannot tell apart from a stored zero.
pub fn decode_int(payload: &[u8]) -> i32 {
    match std::str::from_utf8(payload).map(|s| s.trim().parse::<i32>()) {
        Ok(Ok(v)) => v,
        _ => {
            warn!(
                "reply payload '{}' is not an integer, decoding as 0",
                String::from_utf8_lossy(payload)
            );
            0
        }
    }
}

/// Decodes a float payload with the same zero-on-failure rule as `decode_int`.
pub fn decode_float(payload: &[u8]) -> f32 {
    match std::str::from_utf8(payload).map(|s| s.trim().parse::<f32>()) {
        Ok(Ok(v)) => v,
        _ => {
            warn!(
                "reply payload '{}' is not a float, decoding as 0",
                String::from_utf8_lossy(payload)
            );
            0.0
        }
    }
}

/// Formats an integer argument.
pub fn encode_int(value: i32) -> String {
    itoa::Buffer::new().format(value).to_string()
}

/// Formats a float argument in shortest round-trip form, independent of locale.
pub fn encode_float(value: f32) -> String {
    if value.is_finite() {
        ryu::Buffer::new().format_finite(value).to_string()
    } else if value.is_nan() {
        "nan".to_string()
    } else if value.is_sign_positive() {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}
