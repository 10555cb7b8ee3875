// src/core/scripting/mod.rs

//! Script hosts that receive relayed messages.

pub mod lua_host;

pub use lua_host::LuaHost;
