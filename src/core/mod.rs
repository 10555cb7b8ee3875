// src/core/mod.rs

//! The bridge core: handle registry, command executor, subscription listeners,
//! the message relay and the tick dispatcher.

pub mod client;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod listener;
pub mod natives;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod scripting;

pub use context::RedisContext;
pub use dispatch::{CallbackError, ScriptHost, TickReport};
pub use errors::RedisError;
pub use protocol::RespFrame;
pub use registry::Handle;
