//! Connectivity reconciliation.
//!
//! Reconnection is observability only: listeners are told that connectivity
//! changed and nothing is replayed. There is no durable queue of failed
//! write-backs; a response that could not be stored while offline is simply
//! fetched again on the next request.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::engine::CacheEngine;

const CHANNEL_CAPACITY: usize = 16;

/// Connectivity signal from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

pub(crate) struct Connectivity {
    events: broadcast::Sender<ConnectivityEvent>,
    online: AtomicBool,
}

impl Connectivity {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { events, online: AtomicBool::new(true) }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record the event and broadcast it; returns how many listeners got it.
    pub(crate) fn notify(&self, event: ConnectivityEvent) -> usize {
        self.online.store(event == ConnectivityEvent::Online, Ordering::SeqCst);
        self.events.send(event).unwrap_or(0)
    }
}

impl CacheEngine {
    /// Handle a connectivity signal and notify listeners.
    pub fn on_connectivity(&self, event: ConnectivityEvent) -> usize {
        let was_online = self.connectivity().is_online();
        let listeners = self.connectivity().notify(event);
        match event {
            ConnectivityEvent::Online if !was_online => {
                tracing::info!(listeners, "connectivity resumed");
            }
            ConnectivityEvent::Offline if was_online => {
                tracing::info!(listeners, "connectivity lost");
            }
            _ => tracing::debug!(?event, listeners, "connectivity unchanged"),
        }
        listeners
    }

    /// Last connectivity state reported by the host.
    pub fn is_online(&self) -> bool {
        self.connectivity().is_online()
    }
}
