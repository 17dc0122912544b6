//! Event dispatch table.
//!
//! Hosts deliver lifecycle, fetch, message, and connectivity events through a
//! single [`CacheEngine::dispatch`] entry point. Each [`EventKind`] maps to one
//! [`EventHandler`]; the defaults call straight into the engine and can be
//! replaced per kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::CacheEngine;
use crate::Error;
use crate::control::{ControlMessage, ControlReply};
use crate::lifecycle::{ActivationReport, InstallReport};
use crate::network::InterceptedRequest;
use crate::reconcile::ConnectivityEvent;
use crate::strategy::Resolved;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Message,
    Connectivity,
}

/// An event delivered by the host runtime.
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(InterceptedRequest),
    Message(ControlMessage),
    Connectivity(ConnectivityEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Install => EventKind::Install,
            Event::Activate => EventKind::Activate,
            Event::Fetch(_) => EventKind::Fetch,
            Event::Message(_) => EventKind::Message,
            Event::Connectivity(_) => EventKind::Connectivity,
        }
    }
}

/// What a handler produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Response(Resolved),
    Reply(ControlReply),
    Notified { listeners: usize },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, engine: &CacheEngine, event: Event) -> Result<EventOutcome, Error>;
}

fn mismatch(expected: EventKind, event: &Event) -> Error {
    Error::UnhandledEvent(format!("{expected:?} handler received {:?}", event.kind()))
}

struct InstallHandler;

#[async_trait]
impl EventHandler for InstallHandler {
    async fn handle(&self, engine: &CacheEngine, event: Event) -> Result<EventOutcome, Error> {
        match event {
            Event::Install => Ok(EventOutcome::Installed(engine.install().await?)),
            other => Err(mismatch(EventKind::Install, &other)),
        }
    }
}

struct ActivateHandler;

#[async_trait]
impl EventHandler for ActivateHandler {
    async fn handle(&self, engine: &CacheEngine, event: Event) -> Result<EventOutcome, Error> {
        match event {
            Event::Activate => Ok(EventOutcome::Activated(engine.activate().await?)),
            other => Err(mismatch(EventKind::Activate, &other)),
        }
    }
}

struct FetchHandler;

#[async_trait]
impl EventHandler for FetchHandler {
    async fn handle(&self, engine: &CacheEngine, event: Event) -> Result<EventOutcome, Error> {
        match event {
            Event::Fetch(request) => Ok(EventOutcome::Response(engine.intercept(request).await)),
            other => Err(mismatch(EventKind::Fetch, &other)),
        }
    }
}

struct MessageHandler;

#[async_trait]
impl EventHandler for MessageHandler {
    async fn handle(&self, engine: &CacheEngine, event: Event) -> Result<EventOutcome, Error> {
        match event {
            Event::Message(message) => Ok(EventOutcome::Reply(engine.handle_message(message).await?)),
            other => Err(mismatch(EventKind::Message, &other)),
        }
    }
}

struct ConnectivityHandler;

#[async_trait]
impl EventHandler for ConnectivityHandler {
    async fn handle(&self, engine: &CacheEngine, event: Event) -> Result<EventOutcome, Error> {
        match event {
            Event::Connectivity(signal) => Ok(EventOutcome::Notified { listeners: engine.on_connectivity(signal) }),
            other => Err(mismatch(EventKind::Connectivity, &other)),
        }
    }
}

/// Handlers keyed by event kind.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl DispatchTable {
    /// A table with no handlers; every event is unhandled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in handler for every event kind.
    pub fn with_defaults() -> Self {
        Self::empty()
            .register(EventKind::Install, Arc::new(InstallHandler))
            .register(EventKind::Activate, Arc::new(ActivateHandler))
            .register(EventKind::Fetch, Arc::new(FetchHandler))
            .register(EventKind::Message, Arc::new(MessageHandler))
            .register(EventKind::Connectivity, Arc::new(ConnectivityHandler))
    }

    /// Register or replace the handler for `kind`.
    pub fn register(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn handler(&self, kind: EventKind) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(&kind).cloned()
    }
}
