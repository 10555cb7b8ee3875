// src/core/relay.rs

//! The message relay: a mutex-guarded FIFO between listener workers and the
//! host's tick.

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;

/// One message crossing from a listener to the tick dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEntry {
    channel: String,
    payload: String,
    callback: String,
}

impl RelayEntry {
    pub fn new(
        channel: impl Into<String>,
        payload: impl Into<String>,
        callback: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            callback: callback.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn callback(&self) -> &str {
        &self.callback
    }

    pub fn into_parts(self) -> (String, String, String) {
        (self.channel, self.payload, self.callback)
    }
}

/// Shared queue of pending entries. Lives as long as the context that owns it.
///
/// Entries are kept in global arrival order, which also preserves per-channel order.
#[derive(Debug, Default)]
pub struct MessageRelay {
    queue: Mutex<VecDeque<RelayEntry>>,
}

impl MessageRelay {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends one entry. The lock is held only for the insertion.
    pub fn push(&self, entry: RelayEntry) {
        self.queue.lock().push_back(entry);
    }

    /// Acquires the relay for a run of pushes under a single lock.
    pub fn lock(&self) -> RelayGuard<'_> {
        RelayGuard {
            queue: self.queue.lock(),
        }
    }

    /// Removes and returns everything queued, waiting for the lock if needed.
    pub fn drain_all(&self) -> Vec<RelayEntry> {
        let taken = std::mem::take(&mut *self.queue.lock());
        taken.into()
    }

    /// Like `drain_all`, but gives up immediately if the lock is held elsewhere.
    pub fn try_drain(&self) -> Option<VecDeque<RelayEntry>> {
        let mut queue = self.queue.try_lock()?;
        Some(std::mem::take(&mut *queue))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Exclusive access to the relay queue. Pushes made through the guard become
/// visible to the dispatcher once it is dropped.
pub struct RelayGuard<'a> {
    queue: MutexGuard<'a, VecDeque<RelayEntry>>,
}

impl RelayGuard<'_> {
    pub fn push(&mut self, entry: RelayEntry) {
        self.queue.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
