// src/core/dispatch.rs

//! The tick dispatcher, run once per host tick on the host's own thread, and
//! the `ScriptHost` contract it uses to reach script callbacks.

use crate::core::relay::MessageRelay;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why a callback could not be delivered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback '{0}' not found")]
    NotFound(String),

    #[error("callback '{callback}' failed: {reason}")]
    Failed { callback: String, reason: String },
}

/// The scripting side of the bridge.
///
/// `invoke` looks up `callback` by name in the current script context and calls
/// it with `payload`, reporting "not found" distinctly from "found but failed".
pub trait ScriptHost {
    fn invoke(&mut self, callback: &str, payload: &str) -> Result<(), CallbackError>;
}

impl<F> ScriptHost for F
where
    F: FnMut(&str, &str) -> Result<(), CallbackError>,
{
    fn invoke(&mut self, callback: &str, payload: &str) -> Result<(), CallbackError> {
        self(callback, payload)
    }
}

/// Several loaded scripts, such as a gamemode plus filterscripts. A message is
/// delivered to every script defining the callback.
#[derive(Debug)]
pub struct HostSet<H> {
    hosts: Vec<H>,
}

impl<H> Default for HostSet<H> {
    fn default() -> Self {
        Self { hosts: Vec::new() }
    }
}

impl<H: ScriptHost> HostSet<H> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, host: H) {
        self.hosts.push(host);
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &H> {
        self.hosts.iter()
    }
}

impl<H: ScriptHost> FromIterator<H> for HostSet<H> {
    fn from_iter<I: IntoIterator<Item = H>>(iter: I) -> Self {
        Self {
            hosts: iter.into_iter().collect(),
        }
    }
}

impl<H: ScriptHost> ScriptHost for HostSet<H> {
    fn invoke(&mut self, callback: &str, payload: &str) -> Result<(), CallbackError> {
        let mut found = false;
        let mut failure = None;
        for host in self.hosts.iter_mut() {
            match host.invoke(callback, payload) {
                Ok(()) => found = true,
                Err(CallbackError::NotFound(_)) => {}
                Err(e) => {
                    found = true;
                    failure.get_or_insert(e);
                }
            }
        }
        match (failure, found) {
            (Some(e), _) => Err(e),
            (None, true) => Ok(()),
            (None, false) => Err(CallbackError::NotFound(callback.to_string())),
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The relay was busy, so nothing was drained this tick.
    pub skipped: bool,
    pub delivered: usize,
    pub missing: usize,
    pub failed: usize,
}

impl TickReport {
    /// Entries taken off the relay during this tick.
    pub fn processed(&self) -> usize {
        self.delivered + self.missing + self.failed
    }
}

/// Drains the relay into script callbacks.
#[derive(Debug, Clone)]
pub struct TickDispatcher {
    relay: Arc<MessageRelay>,
}

impl TickDispatcher {
    pub fn new(relay: Arc<MessageRelay>) -> Self {
        Self { relay }
    }

    /// Never blocks: a relay held by a listener defers delivery to the next
    /// tick. Only entries queued when the drain starts are delivered.
    pub fn tick<H: ScriptHost + ?Sized>(&self, host: &mut H) -> TickReport {
        let Some(batch) = self.relay.try_drain() else {
            debug!("relay busy, deferring delivery to the next tick");
            return TickReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = TickReport::default();
        for entry in batch {
            match host.invoke(entry.callback(), entry.payload()) {
                Ok(()) => report.delivered += 1,
                Err(CallbackError::NotFound(name)) => {
                    error!(
                        "no callback '{}' for message on '{}', dropping it",
                        name,
                        entry.channel()
                    );
                    report.missing += 1;
                }
                Err(e) => {
                    warn!("message on '{}': {}", entry.channel(), e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}
