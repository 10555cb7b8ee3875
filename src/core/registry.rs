// src/core/registry.rs

//! The handle registry: maps small integer handles to live connections and
//! subscriptions.
//!
//! Handles come from a single monotonic counter shared by both entry kinds and
//! are never reused, so a stale handle can only ever fail lookup.

use crate::core::client::{Endpoint, StoreClient};
use crate::core::errors::{RedisError, Result};
use crate::core::listener::{ListenerHandle, Source};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use strum_macros::Display;
use tokio::sync::Mutex;

/// The integer identifier scripts use to refer to a connection or subscription.
pub type Handle = i32;

/// What a connection is used for. Pub/sub links are always opened fresh by a
/// listener and never accept ordinary commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionRole {
    Command,
    PubSub,
}

/// An open (or about to be opened) link to the store.
///
/// The link sits behind an async mutex: the executor holds it for one round
/// trip, a listener holds it for its whole lifetime.
#[derive(Debug)]
pub struct Connection {
    endpoint: Endpoint,
    role: ConnectionRole,
    link: Mutex<Option<StoreClient>>,
}

impl Connection {
    pub fn new(endpoint: Endpoint, role: ConnectionRole, client: Option<StoreClient>) -> Self {
        Self {
            endpoint,
            role,
            link: Mutex::new(client),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn link(&self) -> &Mutex<Option<StoreClient>> {
        &self.link
    }

    /// Closes the underlying link, if it is still open.
    pub async fn close(&self) {
        if let Some(client) = self.link.lock().await.take() {
            client.close().await;
        }
    }
}

/// A live listener feeding the relay from one channel or list.
#[derive(Debug)]
pub struct Subscription {
    pub source: Source,
    pub callback: String,
    pub connection: Arc<Connection>,
    pub listener: ListenerHandle,
}

#[derive(Debug)]
pub enum Entry {
    Connection(Arc<Connection>),
    Subscription(Subscription),
}

/// Owns every connection and subscription created by scripts.
#[derive(Debug, Default)]
pub struct Registry {
    next_handle: AtomicI32,
    entries: DashMap<Handle, Entry>,
    /// Source → owning handle. `None` marks a subscribe still in progress.
    sources: DashMap<Source, Option<Handle>>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    fn allocate(&self) -> Result<Handle> {
        self.next_handle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |h| h.checked_add(1))
            .map_err(|_| RedisError::ConnectFail("handle space exhausted".to_string()))
    }

    /// Stores a command connection under a fresh handle.
    pub fn insert_connection(&self, connection: Connection) -> Result<Handle> {
        let handle = self.allocate()?;
        self.entries.insert(handle, Entry::Connection(Arc::new(connection)));
        Ok(handle)
    }

    /// Claims `source` in the channel-keyed view before a listener is started.
    pub fn reserve_source(&self, source: &Source) -> Result<()> {
        match self.sources.entry(source.clone()) {
            MapEntry::Occupied(_) => Err(RedisError::AlreadySubscribed(source.name().to_string())),
            MapEntry::Vacant(slot) => {
                slot.insert(None);
                Ok(())
            }
        }
    }

    /// Drops a reservation whose listener never reached its listening state.
    pub fn release_source(&self, source: &Source) {
        self.sources.remove_if(source, |_, owner| owner.is_none());
    }

    /// Stores a running subscription under a fresh handle, completing its reservation.
    pub fn insert_subscription(&self, subscription: Subscription) -> Result<Handle> {
        let handle = match self.allocate() {
            Ok(handle) => handle,
            Err(e) => {
                self.release_source(&subscription.source);
                return Err(e);
            }
        };
        self.sources.insert(subscription.source.clone(), Some(handle));
        self.entries.insert(handle, Entry::Subscription(subscription));
        Ok(handle)
    }

    /// Looks up the command connection behind `handle`.
    pub fn resolve(&self, handle: Handle) -> Result<Arc<Connection>> {
        let entry = self
            .entries
            .get(&handle)
            .ok_or(RedisError::InvalidHandle(handle))?;
        match entry.value() {
            Entry::Connection(conn) if conn.role() == ConnectionRole::Command => Ok(conn.clone()),
            Entry::Connection(_) => Err(RedisError::MissingConnection(handle)),
            Entry::Subscription(_) => Err(RedisError::UnexpectedResultType(format!(
                "handle {handle} is a subscription, not a command connection"
            ))),
        }
    }

    /// Endpoint of a command connection, used to open a listener's own link.
    pub fn endpoint(&self, handle: Handle) -> Result<Endpoint> {
        self.resolve(handle).map(|conn| conn.endpoint().clone())
    }

    /// Removes the entry for `handle`, handing ownership back to the caller for teardown.
    pub fn remove(&self, handle: Handle) -> Result<Entry> {
        let (_, entry) = self
            .entries
            .remove(&handle)
            .ok_or(RedisError::InvalidHandle(handle))?;
        if let Entry::Subscription(sub) = &entry {
            self.sources
                .remove_if(&sub.source, |_, owner| *owner == Some(handle));
        }
        Ok(entry)
    }

    /// Removes `handle` only if it is a subscription.
    pub fn remove_subscription(&self, handle: Handle) -> Result<Subscription> {
        let is_subscription = self
            .entries
            .get(&handle)
            .map(|e| matches!(e.value(), Entry::Subscription(_)))
            .ok_or(RedisError::InvalidHandle(handle))?;
        if !is_subscription {
            return Err(RedisError::UnexpectedResultType(format!(
                "handle {handle} is a connection, not a subscription"
            )));
        }
        match self.remove(handle)? {
            Entry::Subscription(sub) => Ok(sub),
            Entry::Connection(_) => Err(RedisError::UnexpectedResultType(format!(
                "handle {handle} is a connection, not a subscription"
            ))),
        }
    }

    /// Runs `f` against the subscription behind `handle`.
    pub fn with_subscription<T>(
        &self,
        handle: Handle,
        f: impl FnOnce(&Subscription) -> T,
    ) -> Result<T> {
        let entry = self
            .entries
            .get(&handle)
            .ok_or(RedisError::InvalidHandle(handle))?;
        match entry.value() {
            Entry::Subscription(sub) => Ok(f(sub)),
            Entry::Connection(_) => Err(RedisError::UnexpectedResultType(format!(
                "handle {handle} is a connection, not a subscription"
            ))),
        }
    }

    /// Handle currently owning `source` in the channel-keyed view.
    pub fn owner_of(&self, source: &Source) -> Option<Handle> {
        self.sources.get(source).and_then(|owner| *owner)
    }

    /// Takes every entry out of the registry. Used at shutdown.
    pub fn drain(&self) -> Vec<(Handle, Entry)> {
        let handles: Vec<Handle> = self.entries.iter().map(|e| *e.key()).collect();
        self.sources.clear();
        handles
            .into_iter()
            .filter_map(|h| self.entries.remove(&h))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
