// src/core/context.rs

//! `RedisContext` is the single object a host creates at startup and passes to
//! every bridge operation. It owns the async runtime the store links run on,
//! the handle registry and the message relay.

use crate::config::ContextConfig;
use crate::core::client::{ClientOptions, Endpoint, StoreClient};
use crate::core::commands::CommandExecutor;
use crate::core::dispatch::{ScriptHost, TickDispatcher, TickReport};
use crate::core::errors::{RedisError, Result};
use crate::core::listener::{Listener, ListenerState, Source};
use crate::core::registry::{Connection, ConnectionRole, Entry, Handle, Registry, Subscription};
use crate::core::relay::MessageRelay;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{self, Runtime};
use tracing::{error, info, warn};

pub struct RedisContext {
    runtime: Runtime,
    registry: Arc<Registry>,
    relay: Arc<MessageRelay>,
    dispatcher: TickDispatcher,
    commands: CommandExecutor,
    options: ClientOptions,
    stop_grace: Duration,
}

impl RedisContext {
    pub fn new(config: &ContextConfig) -> Result<Self> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("pawn-redis-worker")
            .enable_all()
            .build()?;
        let registry = Arc::new(Registry::new());
        let relay = Arc::new(MessageRelay::new());
        let commands = CommandExecutor::new(registry.clone(), runtime.handle().clone());
        Ok(Self {
            runtime,
            dispatcher: TickDispatcher::new(relay.clone()),
            registry,
            relay,
            commands,
            options: ClientOptions {
                connect_timeout: config.connect_timeout,
                request_timeout: config.request_timeout,
            },
            stop_grace: config.unsubscribe_grace,
        })
    }

    /// Opens a command connection and returns its handle.
    pub fn connect(&self, host: &str, port: i32, auth: &str) -> Result<Handle> {
        let endpoint = Endpoint::new(host, port, auth)?;
        let client = self
            .runtime
            .block_on(StoreClient::connect(&endpoint, &self.options))
            .inspect_err(|e| error!("failed to connect to {}: {}", endpoint, e))?;
        let handle = self.registry.insert_connection(Connection::new(
            endpoint.clone(),
            ConnectionRole::Command,
            Some(client),
        ))?;
        info!("connected to {} as handle {}", endpoint, handle);
        Ok(handle)
    }

    /// Releases a connection or subscription handle and closes its link.
    pub fn disconnect(&self, handle: Handle) -> Result<()> {
        match self.registry.remove(handle)? {
            Entry::Connection(connection) => {
                self.runtime.block_on(connection.close());
                info!("handle {} disconnected from {}", handle, connection.endpoint());
            }
            Entry::Subscription(subscription) => self.stop_subscription(handle, subscription),
        }
        Ok(())
    }

    /// Subscribes to `channel` using a new link to the same store as `handle`.
    /// Messages are delivered to `callback` on later ticks.
    pub fn subscribe(&self, handle: Handle, channel: &str, callback: &str) -> Result<Handle> {
        self.start_listener(handle, Source::Channel(channel.to_string()), callback)
    }

    /// Binds `callback` to the message queue `list`, consumed with a blocking pop.
    pub fn bind_message(&self, handle: Handle, list: &str, callback: &str) -> Result<Handle> {
        self.start_listener(handle, Source::Queue(list.to_string()), callback)
    }

    /// Stops the listener behind a subscription handle and releases it.
    pub fn unsubscribe(&self, handle: Handle) -> Result<()> {
        let subscription = self.registry.remove_subscription(handle)?;
        self.stop_subscription(handle, subscription);
        Ok(())
    }

    fn start_listener(&self, handle: Handle, source: Source, callback: &str) -> Result<Handle> {
        let endpoint = self.registry.endpoint(handle)?;
        self.registry.reserve_source(&source)?;

        let connection = Arc::new(Connection::new(endpoint, ConnectionRole::PubSub, None));
        let (listener, ready) = Listener::new(
            source.clone(),
            callback.to_string(),
            connection.clone(),
            self.relay.clone(),
            self.options,
        )
        .spawn(self.runtime.handle());

        let failure = match self.runtime.block_on(ready) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(RedisError::SubscribeThreadError(format!(
                "listener for {source} exited before it was ready"
            ))),
        };
        if let Some(e) = failure {
            self.registry.release_source(&source);
            self.runtime.block_on(listener.stop(self.stop_grace));
            return Err(e);
        }

        let sub_handle = self.registry.insert_subscription(Subscription {
            source: source.clone(),
            callback: callback.to_string(),
            connection,
            listener,
        })?;
        info!(
            "handle {} subscribed to {} as handle {}",
            handle, source, sub_handle
        );
        Ok(sub_handle)
    }

    fn stop_subscription(&self, handle: Handle, subscription: Subscription) {
        let Subscription {
            source,
            connection,
            listener,
            ..
        } = subscription;
        let clean = self.runtime.block_on(async {
            let clean = listener.stop(self.stop_grace).await;
            connection.close().await;
            clean
        });
        if clean {
            info!("handle {} unsubscribed from {}", handle, source);
        } else {
            warn!("handle {} unsubscribed from {} after aborting its listener", handle, source);
        }
    }

    /// Current state of the listener behind a subscription handle.
    pub fn listener_state(&self, handle: Handle) -> Result<ListenerState> {
        self.registry
            .with_subscription(handle, |sub| sub.listener.state())
    }

    /// Subscription handle currently listening on `channel`, if any.
    pub fn channel_owner(&self, channel: &str) -> Option<Handle> {
        self.registry
            .owner_of(&Source::Channel(channel.to_string()))
    }

    /// Delivers queued messages to `host`. Call once per host tick, on the host thread.
    pub fn tick_drain<H: ScriptHost + ?Sized>(&self, host: &mut H) -> TickReport {
        self.dispatcher.tick(host)
    }

    pub fn commands(&self) -> &CommandExecutor {
        &self.commands
    }

    pub fn relay(&self) -> &Arc<MessageRelay> {
        &self.relay
    }

    /// Messages received but not yet delivered.
    pub fn pending_messages(&self) -> usize {
        self.relay.len()
    }

    /// Number of live handles.
    pub fn handle_count(&self) -> usize {
        self.registry.len()
    }

    pub fn runtime_handle(&self) -> &runtime::Handle {
        self.runtime.handle()
    }

    /// Closes every connection and stops every listener.
    pub fn close_all(&self) {
        for (handle, entry) in self.registry.drain() {
            match entry {
                Entry::Connection(connection) => self.runtime.block_on(connection.close()),
                Entry::Subscription(subscription) => self.stop_subscription(handle, subscription),
            }
        }
    }
}

impl Drop for RedisContext {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            info!("closing {} open handle(s)", self.registry.len());
            self.close_all();
        }
    }
}
