// src/core/protocol/mod.rs

//! The store's wire format: RESP frames, their codec and reply validation.

pub mod reply;
pub mod resp_frame;

pub use reply::ReplyExt;
pub use resp_frame::{RespFrame, RespFrameCodec};
