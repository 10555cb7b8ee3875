// src/core/client/mod.rs

//! A minimal asynchronous store client. One `StoreClient` owns exactly one TCP
//! link; it is used either for request/response traffic or, once subscribed,
//! for reading pushed messages.

use crate::core::errors::{RedisError, Result};
use crate::core::protocol::{ReplyExt, RespFrame, RespFrameCodec};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::net::{TcpStream, lookup_host};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Where a connection points and how it authenticates.
///
/// Listeners receive a clone of this, never the caller's link, so they can
/// open their own dedicated connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub auth: Option<String>,
}

impl Endpoint {
    /// Validates raw host-side values. An empty credential means "no AUTH".
    pub fn new(host: &str, port: i32, auth: &str) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(RedisError::ConnectFail("empty hostname".to_string()));
        }
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| RedisError::ConnectFail(format!("port {port} out of range")))?;
        Ok(Self {
            host: host.to_string(),
            port,
            auth: (!auth.is_empty()).then(|| auth.to_string()),
        })
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Timeouts applied to a single link.
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Bounds the TCP connect and the AUTH round trip.
    pub connect_timeout: Duration,
    /// Bounds each request/response round trip. `None` waits for the reply indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: None,
        }
    }
}

/// One open link to the store.
#[derive(Debug)]
pub struct StoreClient {
    framed: Framed<TcpStream, RespFrameCodec>,
    endpoint: Endpoint,
    request_timeout: Option<Duration>,
}

impl StoreClient {
    /// Opens a link and authenticates when the endpoint carries a credential.
    pub async fn connect(endpoint: &Endpoint, options: &ClientOptions) -> Result<Self> {
        // Resolution and the TCP connect share one deadline.
        let dial = async {
            let addrs: Vec<_> = lookup_host((endpoint.host.as_str(), endpoint.port))
                .await
                .map_err(|e| RedisError::ConnectFail(format!("{endpoint}: {e}")))?
                .collect();
            if addrs.is_empty() {
                return Err(RedisError::ConnectFail(format!(
                    "{endpoint}: hostname resolved to no addresses"
                )));
            }
            TcpStream::connect(addrs.as_slice())
                .await
                .map_err(|e| RedisError::ConnectGeneric(format!("{endpoint}: {e}")))
        };
        let stream = match tokio::time::timeout(options.connect_timeout, dial).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RedisError::ConnectGeneric(format!(
                    "{endpoint}: connect timed out after {:?}",
                    options.connect_timeout
                )));
            }
        };
        // Small request frames; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY on {}: {}", endpoint, e);
        }

        let mut client = Self {
            framed: Framed::new(stream, RespFrameCodec),
            endpoint: endpoint.clone(),
            request_timeout: options.request_timeout,
        };

        if let Some(auth) = endpoint.auth.clone() {
            client.authenticate(&auth, options.connect_timeout).await?;
        }
        Ok(client)
    }

    async fn authenticate(&mut self, auth: &str, timeout: Duration) -> Result<()> {
        let frame = RespFrame::command(["AUTH", auth]);
        let reply = match tokio::time::timeout(timeout, self.request_untimed(frame)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(RedisError::ConnectGeneric(format!("AUTH failed: {e}"))),
            Err(_) => return Err(RedisError::ConnectGeneric("AUTH timed out".to_string())),
        };
        match reply.expect_status() {
            Ok(_) => Ok(()),
            Err(RedisError::BadReply(msg)) => Err(RedisError::ConnectAuth(msg)),
            Err(e) => Err(RedisError::ConnectAuth(e.to_string())),
        }
    }

    /// Sends one request and waits for its reply.
    pub async fn request(&mut self, frame: RespFrame) -> Result<RespFrame> {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.request_untimed(frame)).await?,
            None => self.request_untimed(frame).await,
        }
    }

    /// Builds a command frame from `args` and sends it with `request`.
    pub async fn call<I, A>(&mut self, args: I) -> Result<RespFrame>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.request(RespFrame::command(args)).await
    }

    async fn request_untimed(&mut self, frame: RespFrame) -> Result<RespFrame> {
        self.send(frame).await?;
        self.next_frame().await
    }

    /// Writes a frame without waiting for any reply.
    pub async fn send(&mut self, frame: RespFrame) -> Result<()> {
        self.framed.send(frame).await
    }

    /// Waits for the next frame pushed by the store. Blocks for as long as it takes.
    pub async fn next_frame(&mut self) -> Result<RespFrame> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => {
                warn!("transport error on {}: {}", self.endpoint, e);
                Err(e)
            }
            None => Err(RedisError::Transport(format!(
                "connection to {} closed by peer",
                self.endpoint
            ))),
        }
    }

    /// Shuts down the write half. Frames the store already sent can still be
    /// read until it hangs up.
    pub async fn shutdown_write(&mut self) -> Result<()> {
        self.framed.close().await
    }

    /// Flushes and shuts down the write half, then drops the link.
    pub async fn close(mut self) {
        if let Err(e) = self.framed.close().await {
            debug!("error while closing link to {}: {}", self.endpoint, e);
        }
    }
}
