// src/core/listener.rs

//! Subscription listeners.
//!
//! Each listener is an independently scheduled task that owns one dedicated
//! link to the store, opened fresh from the endpoint of the connection it was
//! derived from. It moves through `Connecting → Subscribed → Listening →
//! Terminated` and only ever touches its own connection and the shared relay.

use crate::core::client::{ClientOptions, StoreClient};
use crate::core::errors::{RedisError, Result};
use crate::core::protocol::{ReplyExt, RespFrame};
use crate::core::registry::Connection;
use crate::core::relay::{MessageRelay, RelayEntry};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after an error reply to a blocking pop before issuing the next one.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What a listener reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// A pub/sub channel, read with SUBSCRIBE.
    Channel(String),
    /// A list used as a message queue, read with BLPOP.
    Queue(String),
}

impl Source {
    pub fn name(&self) -> &str {
        match self {
            Source::Channel(name) | Source::Queue(name) => name,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Channel(name) => write!(f, "channel '{name}'"),
            Source::Queue(name) => write!(f, "queue '{name}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ListenerState {
    Connecting,
    Subscribed,
    Listening,
    Terminated,
}

/// Control side of a running listener, kept in the registry.
///
/// Dropping the handle also stops the listener.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    state: watch::Receiver<ListenerState>,
}

impl ListenerHandle {
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Signals the listener to stop and waits up to `grace` for it to close its
    /// link. A listener still running after `grace` is aborted. Returns whether
    /// it exited on its own.
    pub async fn stop(mut self, grace: Duration) -> bool {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(task) = self.task.take() else {
            return true;
        };
        let abort = task.abort_handle();
        match tokio::time::timeout(grace, task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("listener task ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!("listener did not stop within {:?}, aborting it", grace);
                abort.abort();
                false
            }
        }
    }
}

/// The worker side of a listener.
pub struct Listener {
    source: Source,
    callback: String,
    connection: Arc<Connection>,
    relay: Arc<MessageRelay>,
    options: ClientOptions,
    state: watch::Sender<ListenerState>,
}

impl Listener {
    pub fn new(
        source: Source,
        callback: String,
        connection: Arc<Connection>,
        relay: Arc<MessageRelay>,
        options: ClientOptions,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Connecting);
        Self {
            source,
            callback,
            connection,
            relay,
            options,
            state,
        }
    }

    /// Starts the listener on `runtime`. The returned receiver resolves once the
    /// listener is listening, or with the error that terminated it before then.
    pub fn spawn(
        self,
        runtime: &tokio::runtime::Handle,
    ) -> (ListenerHandle, oneshot::Receiver<Result<()>>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let state = self.state.subscribe();
        let task = runtime.spawn(self.run(shutdown_rx, ready_tx));
        let handle = ListenerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
            state,
        };
        (handle, ready_rx)
    }

    fn set_state(&self, next: ListenerState) {
        debug!("listener for {}: {}", self.source, next);
        self.state.send_replace(next);
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>, ready: oneshot::Sender<Result<()>>) {
        let mut link = self.connection.link().lock().await;

        let client = match StoreClient::connect(self.connection.endpoint(), &self.options).await {
            Ok(client) => link.insert(client),
            Err(e) => {
                error!("listener for {} could not connect: {}", self.source, e);
                self.set_state(ListenerState::Terminated);
                let _ = ready.send(Err(e));
                return;
            }
        };

        self.set_state(ListenerState::Subscribed);
        if let Err(e) = self.confirm_subscription(client).await {
            error!("listener for {} could not subscribe: {}", self.source, e);
            if let Some(client) = link.take() {
                client.close().await;
            }
            self.set_state(ListenerState::Terminated);
            let _ = ready.send(Err(e));
            return;
        }

        self.set_state(ListenerState::Listening);
        if ready.send(Ok(())).is_err() {
            debug!("subscriber for {} went away before the listener was ready", self.source);
        } else {
            info!("listening on {} for callback '{}'", self.source, self.callback);
            let outcome = match &self.source {
                Source::Channel(channel) => self.listen_channel(client, channel, &mut shutdown).await,
                Source::Queue(list) => self.listen_queue(client, list, &mut shutdown).await,
            };
            match outcome {
                Ok(()) => info!("listener for {} stopped", self.source),
                Err(e) => error!("listener for {} terminated: {}", self.source, e),
            }
        }

        if let Some(client) = link.take() {
            client.close().await;
        }
        self.set_state(ListenerState::Terminated);
    }

    /// Issues the subscribe request and waits, bounded by the connect timeout,
    /// for the store to confirm it.
    async fn confirm_subscription(&self, client: &mut StoreClient) -> Result<()> {
        let confirm = async {
            match &self.source {
                Source::Channel(channel) => {
                    client
                        .send(RespFrame::command(["SUBSCRIBE", channel.as_str()]))
                        .await?;
                    match client.next_frame().await? {
                        RespFrame::Array(items) => match items.as_slice() {
                            [
                                RespFrame::BulkString(kind),
                                RespFrame::BulkString(name),
                                RespFrame::Integer(_),
                            ] if kind.eq_ignore_ascii_case(b"subscribe")
                                && &name[..] == channel.as_bytes() =>
                            {
                                Ok(())
                            }
                            _ => Err(RedisError::BadReply(
                                "malformed subscribe confirmation".to_string(),
                            )),
                        },
                        RespFrame::Error(msg) => Err(RedisError::BadReply(msg)),
                        other => Err(RedisError::BadReply(format!(
                            "expected subscribe confirmation, got {}",
                            other.kind()
                        ))),
                    }
                }
                // Lists need no subscription; check the link is alive instead.
                Source::Queue(_) => client.call(["PING"]).await?.expect_status().map(|_| ()),
            }
        };

        match tokio::time::timeout(self.options.connect_timeout, confirm).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RedisError::SubscribeThreadError(e.to_string())),
            Err(_) => Err(RedisError::SubscribeThreadError(format!(
                "no confirmation for {} within {:?}",
                self.source, self.options.connect_timeout
            ))),
        }
    }

    async fn listen_channel(
        &self,
        client: &mut StoreClient,
        channel: &str,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<()> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = &mut *shutdown => return Ok(()),
                frame = client.next_frame() => frame?,
            };

            let RespFrame::Array(items) = frame else {
                warn!(
                    "ignoring {} frame on {}, expected a message array",
                    frame.kind(),
                    self.source
                );
                continue;
            };
            match items.as_slice() {
                [
                    RespFrame::BulkString(kind),
                    RespFrame::BulkString(name),
                    RespFrame::BulkString(payload),
                ] if kind.eq_ignore_ascii_case(b"message") => {
                    if &name[..] != channel.as_bytes() {
                        warn!(
                            "ignoring message for channel '{}' on {}",
                            String::from_utf8_lossy(name),
                            self.source
                        );
                        continue;
                    }
                    self.relay(payload);
                }
                [RespFrame::BulkString(kind), ..]
                    if kind.eq_ignore_ascii_case(b"subscribe")
                        || kind.eq_ignore_ascii_case(b"unsubscribe")
                        || kind.eq_ignore_ascii_case(b"pong") =>
                {
                    debug!(
                        "control event '{}' on {}",
                        String::from_utf8_lossy(kind),
                        self.source
                    );
                }
                _ => warn!("ignoring malformed pub/sub event on {}", self.source),
            }
        }
    }

    async fn listen_queue(
        &self,
        client: &mut StoreClient,
        list: &str,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<()> {
        loop {
            client
                .send(RespFrame::command(["BLPOP", list, "0"]))
                .await?;
            let frame = tokio::select! {
                biased;
                _ = &mut *shutdown => return self.finish_pop(client, list).await,
                frame = client.next_frame() => frame?,
            };

            if let Some(msg) = self.accept_pop_reply(frame, list) {
                warn!("pop on {} rejected: {}", self.source, msg);
                tokio::select! {
                    biased;
                    _ = &mut *shutdown => return Ok(()),
                    _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    /// Ends the outstanding pop without losing its element. The store either
    /// answers the pop before it sees the half-close, or hangs up with the
    /// element still in the list.
    async fn finish_pop(&self, client: &mut StoreClient, list: &str) -> Result<()> {
        client.shutdown_write().await?;
        let drain = async {
            while let Ok(frame) = client.next_frame().await {
                self.accept_pop_reply(frame, list);
            }
        };
        if tokio::time::timeout(self.options.connect_timeout, drain)
            .await
            .is_err()
        {
            warn!("store kept the link to {} open after the half-close", self.source);
        }
        Ok(())
    }

    /// Relays the element carried by a pop reply. Returns the message of an
    /// error reply.
    fn accept_pop_reply(&self, frame: RespFrame, list: &str) -> Option<String> {
        match frame {
            RespFrame::Array(items) => match items.as_slice() {
                [RespFrame::BulkString(key), RespFrame::BulkString(value)]
                    if &key[..] == list.as_bytes() =>
                {
                    self.relay(value);
                }
                _ => warn!("ignoring malformed pop reply on {}", self.source),
            },
            // The blocking pop gave up without data.
            RespFrame::NullArray | RespFrame::Null => {}
            RespFrame::Error(msg) => return Some(msg),
            other => warn!("ignoring {} reply on {}", other.kind(), self.source),
        }
        None
    }

    fn relay(&self, payload: &[u8]) {
        let entry = RelayEntry::new(
            self.source.name(),
            String::from_utf8_lossy(payload),
            self.callback.as_str(),
        );
        debug!("relaying {} bytes from {}", payload.len(), self.source);
        self.relay.push(entry);
    }
}
