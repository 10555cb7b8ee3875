// src/core/commands.rs

//! The command executor: one synchronous request/response call per store
//! primitive, issued over a connection resolved from the registry.
//!
//! Every operation resolves its handle first and fails without touching the
//! network if that fails. No operation retries; a failure is returned to the
//! caller, who may retry. A transport failure drops the handle's link, after
//! which its calls fail with `MissingConnection` until it is disconnected.

use crate::core::errors::{RedisError, Result};
use crate::core::protocol::reply::{decode_float, decode_int, encode_float, encode_int};
use crate::core::protocol::{ReplyExt, RespFrame};
use crate::core::registry::{Handle, Registry};
use bytes::Bytes;
use std::sync::Arc;
use tokio::runtime;
use tracing::{debug, warn};

/// Issues commands on behalf of scripts. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    registry: Arc<Registry>,
    runtime: runtime::Handle,
}

impl CommandExecutor {
    pub fn new(registry: Arc<Registry>, runtime: runtime::Handle) -> Self {
        Self { registry, runtime }
    }

    /// Sends `frame` over the connection behind `handle` and blocks until the reply.
    pub fn request(&self, handle: Handle, frame: RespFrame) -> Result<RespFrame> {
        let connection = self.registry.resolve(handle)?;
        let result = self.runtime.block_on(async {
            let mut link = connection.link().lock().await;
            let client = link
                .as_mut()
                .ok_or(RedisError::MissingConnection(handle))?;
            let result = client.request(frame).await;
            // A late reply would be read as the answer to the next request.
            if let Err(e) = &result
                && e.is_transport()
                && let Some(client) = link.take()
            {
                debug!("dropping link of handle {} after: {}", handle, e);
                client.close().await;
            }
            result
        });
        if let Err(e) = &result
            && e.is_transport()
        {
            warn!("request on handle {} failed: {}", handle, e);
        }
        result
    }

    fn call<I, A>(&self, handle: Handle, args: I) -> Result<RespFrame>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.request(handle, RespFrame::command(args))
    }

    /// Runs a raw, whitespace-separated command. Any non-error reply is returned as is.
    pub fn command(&self, handle: Handle, command: &str) -> Result<RespFrame> {
        let args: Vec<&str> = command.split_whitespace().collect();
        if args.is_empty() {
            return Err(RedisError::BadReply("empty command".to_string()));
        }
        debug!("raw command on handle {}: {}", handle, args[0]);
        self.call(handle, args)?.into_result()
    }

    pub fn ping(&self, handle: Handle) -> Result<()> {
        self.call(handle, ["PING"])?.expect_status().map(|_| ())
    }

    pub fn exists(&self, handle: Handle, key: &str) -> Result<bool> {
        Ok(self.call(handle, ["EXISTS", key])?.expect_integer()? > 0)
    }

    /// Deletes `key`, returning how many keys were removed.
    pub fn delete(&self, handle: Handle, key: &str) -> Result<i64> {
        self.call(handle, ["DEL", key])?.expect_integer()
    }

    pub fn set_string(&self, handle: Handle, key: &str, value: &str) -> Result<()> {
        self.call(handle, ["SET", key, value])?
            .expect_status()
            .map(|_| ())
    }

    /// Fails with `NoReply` when the key does not exist.
    pub fn get_string(&self, handle: Handle, key: &str) -> Result<String> {
        self.get_bulk(handle, key)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    fn get_bulk(&self, handle: Handle, key: &str) -> Result<Bytes> {
        self.call(handle, ["GET", key])?.expect_bulk()
    }

    pub fn set_int(&self, handle: Handle, key: &str, value: i32) -> Result<()> {
        self.set_string(handle, key, &encode_int(value))
    }

    /// An unparsable stored value decodes as zero.
    pub fn get_int(&self, handle: Handle, key: &str) -> Result<i32> {
        self.get_bulk(handle, key).map(|b| decode_int(&b))
    }

    pub fn set_float(&self, handle: Handle, key: &str, value: f32) -> Result<()> {
        self.set_string(handle, key, &encode_float(value))
    }

    /// An unparsable stored value decodes as zero.
    pub fn get_float(&self, handle: Handle, key: &str) -> Result<f32> {
        self.get_bulk(handle, key).map(|b| decode_float(&b))
    }

    /// Sets one hash field. Creating and overwriting a field both succeed.
    pub fn set_hash_value(&self, handle: Handle, key: &str, field: &str, value: &str) -> Result<()> {
        self.call(handle, ["HSET", key, field, value])?
            .expect_integer()
            .map(|_| ())
    }

    pub fn get_hash_value(&self, handle: Handle, key: &str, field: &str) -> Result<String> {
        self.get_hash_bulk(handle, key, field)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    fn get_hash_bulk(&self, handle: Handle, key: &str, field: &str) -> Result<Bytes> {
        self.call(handle, ["HGET", key, field])?.expect_bulk()
    }

    pub fn set_hash_int(&self, handle: Handle, key: &str, field: &str, value: i32) -> Result<()> {
        self.set_hash_value(handle, key, field, &encode_int(value))
    }

    pub fn get_hash_int(&self, handle: Handle, key: &str, field: &str) -> Result<i32> {
        self.get_hash_bulk(handle, key, field)
            .map(|b| decode_int(&b))
    }

    pub fn set_hash_float(&self, handle: Handle, key: &str, field: &str, value: f32) -> Result<()> {
        self.set_hash_value(handle, key, field, &encode_float(value))
    }

    pub fn get_hash_float(&self, handle: Handle, key: &str, field: &str) -> Result<f32> {
        self.get_hash_bulk(handle, key, field)
            .map(|b| decode_float(&b))
    }

    /// Sets many fields in one request, returning how many were newly created.
    pub fn set_hash_values(
        &self,
        handle: Handle,
        key: &str,
        pairs: &[(&str, &str)],
    ) -> Result<i64> {
        let mut args = Vec::with_capacity(2 + pairs.len() * 2);
        args.push("HSET");
        args.push(key);
        for &(field, value) in pairs {
            args.push(field);
            args.push(value);
        }
        self.call(handle, args)?.expect_integer()
    }

    /// Reads every field of a hash. A missing key yields no pairs.
    pub fn get_hash_values(&self, handle: Handle, key: &str) -> Result<Vec<(String, String)>> {
        let items = self.call(handle, ["HGETALL", key])?.expect_array()?;
        if items.len() % 2 != 0 {
            return Err(RedisError::BadReply(format!(
                "HGETALL returned {} elements, expected field/value pairs",
                items.len()
            )));
        }
        items
            .chunks_exact(2)
            .map(|pair| match (pair[0].as_text(), pair[1].as_text()) {
                (Some(field), Some(value)) => Ok((field, value)),
                _ => Err(RedisError::BadReply(
                    "HGETALL pair is not a pair of strings".to_string(),
                )),
            })
            .collect()
    }

    /// Increments an integer field, returning its new value.
    pub fn hash_incr(&self, handle: Handle, key: &str, field: &str, by: i32) -> Result<i64> {
        self.call(handle, ["HINCRBY", key, field, &encode_int(by)])?
            .expect_integer()
    }

    pub fn hash_exists(&self, handle: Handle, key: &str, field: &str) -> Result<bool> {
        Ok(self.call(handle, ["HEXISTS", key, field])?.expect_integer()? == 1)
    }

    /// Removes a field, returning whether it existed.
    pub fn hash_delete(&self, handle: Handle, key: &str, field: &str) -> Result<bool> {
        Ok(self.call(handle, ["HDEL", key, field])?.expect_integer()? > 0)
    }

    /// Publishes `data` on `channel`, returning how many subscribers received it.
    pub fn publish(&self, handle: Handle, channel: &str, data: &str) -> Result<i64> {
        self.call(handle, ["PUBLISH", channel, data])?
            .expect_integer()
    }

    /// Appends `data` to the message queue `list`, returning the queue length.
    pub fn send_message(&self, handle: Handle, list: &str, data: &str) -> Result<i64> {
        self.call(handle, ["RPUSH", list, data])?.expect_integer()
    }
}
