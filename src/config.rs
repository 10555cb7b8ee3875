// src/config.rs

//! Configuration for the bridge and for the `pawn-redis-host` binary:
//! loading, defaults and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Settings consumed by `RedisContext`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Bounds TCP connect, AUTH and listener subscription confirmation.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Bounds each command round trip. Unset means wait for the reply indefinitely.
    #[serde(with = "humantime_serde", default)]
    pub request_timeout: Option<Duration>,
    /// Worker threads of the runtime that drives store links and listeners.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// How long unsubscribe waits for a listener to close before aborting it.
    #[serde(with = "humantime_serde", default = "default_unsubscribe_grace")]
    pub unsubscribe_grace: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
            worker_threads: default_worker_threads(),
            unsubscribe_grace: default_unsubscribe_grace(),
        }
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_worker_threads() -> usize {
    2
}
fn default_unsubscribe_grace() -> Duration {
    Duration::from_secs(1)
}

/// The store the host binary connects to on startup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_store_host")]
    pub host: String,
    #[serde(default = "default_store_port")]
    pub port: u16,
    /// Empty or missing means no AUTH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            port: default_store_port(),
            auth: None,
        }
    }
}

fn default_store_host() -> String {
    "127.0.0.1".to_string()
}
fn default_store_port() -> u16 {
    6379
}

/// A pub/sub channel bound to a script callback at startup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    pub channel: String,
    pub callback: String,
}

/// A list-backed message queue bound to a script callback at startup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub list: String,
    pub callback: String,
}

/// Full configuration of the host binary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Period of the host tick loop.
    #[serde(with = "humantime_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,
    /// Lua script defining the callbacks.
    #[serde(default = "default_script")]
    pub script: PathBuf,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(flatten)]
    pub context: ContextConfig,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tick_interval: default_tick_interval(),
            script: default_script(),
            store: StoreConfig::default(),
            context: ContextConfig::default(),
            subscriptions: Vec::new(),
            queues: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_tick_interval() -> Duration {
    Duration::from_millis(5)
}
fn default_script() -> PathBuf {
    PathBuf::from("callbacks.lua")
}

impl Config {
    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.port == 0 {
            return Err(anyhow!("store.port cannot be 0"));
        }
        if self.store.host.trim().is_empty() {
            return Err(anyhow!("store.host cannot be empty"));
        }
        if self.tick_interval.is_zero() {
            return Err(anyhow!("tick_interval cannot be 0"));
        }
        if self.context.worker_threads == 0 {
            return Err(anyhow!("worker_threads cannot be 0"));
        }
        if self.context.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout cannot be 0"));
        }
        if let Some(timeout) = self.context.request_timeout
            && timeout.is_zero()
        {
            return Err(anyhow!("request_timeout cannot be 0; leave it unset to wait indefinitely"));
        }

        for (i, sub) in self.subscriptions.iter().enumerate() {
            if sub.channel.is_empty() {
                return Err(anyhow!("subscription #{}: channel cannot be empty", i + 1));
            }
            if sub.callback.is_empty() {
                return Err(anyhow!("subscription #{}: callback cannot be empty", i + 1));
            }
        }
        for (i, queue) in self.queues.iter().enumerate() {
            if queue.list.is_empty() {
                return Err(anyhow!("queue #{}: list cannot be empty", i + 1));
            }
            if queue.callback.is_empty() {
                return Err(anyhow!("queue #{}: callback cannot be empty", i + 1));
            }
        }

        if self.tick_interval > Duration::from_secs(1) {
            warn!(
                "tick_interval of {:?} will delay message delivery noticeably",
                self.tick_interval
            );
        }
        Ok(())
    }
}
