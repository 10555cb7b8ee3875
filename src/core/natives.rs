// src/core/natives.rs

//! The host boundary: every operation returns an integer status code (0 on
//! success) and writes "get" results through an out-parameter, which is left
//! untouched on failure. `connect` instead returns the new handle, or one of
//! the negative connect codes.

use crate::core::context::RedisContext;
use crate::core::errors::Result;
use crate::core::registry::Handle;
use tracing::debug;

pub const OK: i32 = 0;

/// Collapses a result into its status code.
pub fn status<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => OK,
        Err(e) => e.code(),
    }
}

fn report<T>(name: &str, result: Result<T>) -> i32 {
    if let Err(e) = &result {
        debug!("{} returned {}: {}", name, e.code(), e);
    }
    status(&result)
}

fn write_out<T>(name: &str, result: Result<T>, out: &mut T) -> i32 {
    match result {
        Ok(value) => {
            *out = value;
            OK
        }
        Err(e) => report::<T>(name, Err(e)),
    }
}

pub fn connect(ctx: &RedisContext, host: &str, port: i32, auth: &str) -> i32 {
    match ctx.connect(host, port, auth) {
        Ok(handle) => handle,
        Err(e) => report::<()>("Connect", Err(e)),
    }
}

pub fn disconnect(ctx: &RedisContext, handle: Handle) -> i32 {
    report("Disconnect", ctx.disconnect(handle))
}

pub fn command(ctx: &RedisContext, handle: Handle, command: &str) -> i32 {
    report("Command", ctx.commands().command(handle, command))
}

/// Writes 1 or 0 to `out`.
pub fn exists(ctx: &RedisContext, handle: Handle, key: &str, out: &mut i32) -> i32 {
    let result = ctx.commands().exists(handle, key).map(i32::from);
    write_out("Exists", result, out)
}

pub fn set_string(ctx: &RedisContext, handle: Handle, key: &str, value: &str) -> i32 {
    report("SetString", ctx.commands().set_string(handle, key, value))
}

pub fn get_string(ctx: &RedisContext, handle: Handle, key: &str, out: &mut String) -> i32 {
    write_out("GetString", ctx.commands().get_string(handle, key), out)
}

pub fn set_int(ctx: &RedisContext, handle: Handle, key: &str, value: i32) -> i32 {
    report("SetInt", ctx.commands().set_int(handle, key, value))
}

pub fn get_int(ctx: &RedisContext, handle: Handle, key: &str, out: &mut i32) -> i32 {
    write_out("GetInt", ctx.commands().get_int(handle, key), out)
}

pub fn set_float(ctx: &RedisContext, handle: Handle, key: &str, value: f32) -> i32 {
    report("SetFloat", ctx.commands().set_float(handle, key, value))
}

pub fn get_float(ctx: &RedisContext, handle: Handle, key: &str, out: &mut f32) -> i32 {
    write_out("GetFloat", ctx.commands().get_float(handle, key), out)
}

pub fn set_hash_value(
    ctx: &RedisContext,
    handle: Handle,
    key: &str,
    field: &str,
    value: &str,
) -> i32 {
    report(
        "SetHashValue",
        ctx.commands().set_hash_value(handle, key, field, value),
    )
}

pub fn get_hash_value(
    ctx: &RedisContext,
    handle: Handle,
    key: &str,
    field: &str,
    out: &mut String,
) -> i32 {
    write_out(
        "GetHashValue",
        ctx.commands().get_hash_value(handle, key, field),
        out,
    )
}

/// Writes the field's new value to `out`, saturated to the host's 32-bit cell.
pub fn hash_incr(
    ctx: &RedisContext,
    handle: Handle,
    key: &str,
    field: &str,
    by: i32,
    out: &mut i32,
) -> i32 {
    let result = ctx
        .commands()
        .hash_incr(handle, key, field, by)
        .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
    write_out("HashIncr", result, out)
}

pub fn hash_exists(
    ctx: &RedisContext,
    handle: Handle,
    key: &str,
    field: &str,
    out: &mut i32,
) -> i32 {
    let result = ctx.commands().hash_exists(handle, key, field).map(i32::from);
    write_out("HashExists", result, out)
}

pub fn hash_delete(ctx: &RedisContext, handle: Handle, key: &str, field: &str) -> i32 {
    report("HashDelete", ctx.commands().hash_delete(handle, key, field))
}

pub fn publish(ctx: &RedisContext, handle: Handle, channel: &str, data: &str) -> i32 {
    report("Publish", ctx.commands().publish(handle, channel, data))
}

pub fn send_message(ctx: &RedisContext, handle: Handle, list: &str, data: &str) -> i32 {
    report("SendMessage", ctx.commands().send_message(handle, list, data))
}

/// Writes the subscription handle to `out`.
pub fn subscribe(
    ctx: &RedisContext,
    handle: Handle,
    channel: &str,
    callback: &str,
    out: &mut Handle,
) -> i32 {
    write_out("Subscribe", ctx.subscribe(handle, channel, callback), out)
}

pub fn unsubscribe(ctx: &RedisContext, handle: Handle) -> i32 {
    report("Unsubscribe", ctx.unsubscribe(handle))
}

/// Writes the queue listener's handle to `out`.
pub fn bind_message(
    ctx: &RedisContext,
    handle: Handle,
    list: &str,
    callback: &str,
    out: &mut Handle,
) -> i32 {
    write_out("BindMessage", ctx.bind_message(handle, list, callback), out)
}
