// src/core/errors.rs

//! Defines the error taxonomy shared by the registry, the command executor and
//! the subscription listeners, together with the integer status codes handed
//! back across the host boundary.

use std::sync::Arc;
use thiserror::Error;

/// A convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Every failure a bridge operation can report.
///
/// Transport-level failures from the store link are caught at the call site and
/// folded into one of these variants; nothing escapes to the host as a panic.
#[derive(Error, Debug)]
pub enum RedisError {
    /// The connect attempt was made but failed: refused, timed out or cut off during AUTH.
    #[error("connect failed: {0}")]
    ConnectGeneric(String),

    /// The link could not be set up at all: bad host or port, or a name that does not resolve.
    #[error("could not open connection: {0}")]
    ConnectFail(String),

    /// The store rejected the supplied credential.
    #[error("authentication rejected: {0}")]
    ConnectAuth(String),

    #[error("invalid handle {0}")]
    InvalidHandle(i32),

    /// The registry entry exists but does not hold a usable connection.
    #[error("handle {0} has no connection attached")]
    MissingConnection(i32),

    /// The reply had the wrong shape, or was an error reply.
    #[error("bad reply: {0}")]
    BadReply(String),

    /// A nil reply was received where data was expected.
    #[error("no reply data")]
    NoReply,

    /// The listener worker failed before it reached its listening state.
    #[error("subscription worker failed: {0}")]
    SubscribeThreadError(String),

    /// The operation was applied to a handle of the wrong kind.
    #[error("unexpected result type: {0}")]
    UnexpectedResultType(String),

    /// The channel or list already has an active listener.
    #[error("'{0}' already has an active listener")]
    AlreadySubscribed(String),

    /// Passthrough for transport errors reported by the store link.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The peer sent bytes that are not valid RESP.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Not enough bytes buffered to decode a full frame. Never surfaced to callers.
    #[error("Incomplete data in stream")]
    IncompleteData,
}

impl RedisError {
    /// Returns the integer status code reported to the host for this error.
    pub fn code(&self) -> i32 {
        match self {
            RedisError::InvalidHandle(_) => 1,
            RedisError::MissingConnection(_) => 2,
            RedisError::BadReply(_) => 3,
            RedisError::NoReply => 4,
            RedisError::SubscribeThreadError(_) => 5,
            RedisError::UnexpectedResultType(_) => 6,
            RedisError::AlreadySubscribed(_) => 7,
            RedisError::ConnectGeneric(_) => -1,
            RedisError::ConnectFail(_) => -2,
            RedisError::ConnectAuth(_) => -3,
            RedisError::Transport(_)
            | RedisError::Io(_)
            | RedisError::Protocol(_)
            | RedisError::IncompleteData => -4,
        }
    }

    /// True for failures of the link itself rather than of a single request.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RedisError::Transport(_) | RedisError::Io(_) | RedisError::Protocol(_)
        )
    }
}

// `std::io::Error` is not cloneable, so it lives behind an Arc.
impl Clone for RedisError {
    fn clone(&self) -> Self {
        match self {
            RedisError::ConnectGeneric(s) => RedisError::ConnectGeneric(s.clone()),
            RedisError::ConnectFail(s) => RedisError::ConnectFail(s.clone()),
            RedisError::ConnectAuth(s) => RedisError::ConnectAuth(s.clone()),
            RedisError::InvalidHandle(h) => RedisError::InvalidHandle(*h),
            RedisError::MissingConnection(h) => RedisError::MissingConnection(*h),
            RedisError::BadReply(s) => RedisError::BadReply(s.clone()),
            RedisError::NoReply => RedisError::NoReply,
            RedisError::SubscribeThreadError(s) => RedisError::SubscribeThreadError(s.clone()),
            RedisError::UnexpectedResultType(s) => RedisError::UnexpectedResultType(s.clone()),
            RedisError::AlreadySubscribed(s) => RedisError::AlreadySubscribed(s.clone()),
            RedisError::Transport(s) => RedisError::Transport(s.clone()),
            RedisError::Io(e) => RedisError::Io(Arc::clone(e)),
            RedisError::Protocol(s) => RedisError::Protocol(s.clone()),
            RedisError::IncompleteData => RedisError::IncompleteData,
        }
    }
}

impl PartialEq for RedisError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RedisError::Io(e1), RedisError::Io(e2)) => e1.kind() == e2.kind(),
            (RedisError::InvalidHandle(h1), RedisError::InvalidHandle(h2)) => h1 == h2,
            (RedisError::MissingConnection(h1), RedisError::MissingConnection(h2)) => h1 == h2,
            (RedisError::AlreadySubscribed(s1), RedisError::AlreadySubscribed(s2)) => s1 == s2,
            // Message text of the remaining variants comes from the peer; only the kind matters.
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for RedisError {
    fn from(e: std::io::Error) -> Self {
        RedisError::Io(Arc::new(e))
    }
}

impl From<tokio::time::error::Elapsed> for RedisError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        RedisError::Transport("request timed out".to_string())
    }
}
