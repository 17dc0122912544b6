//! Core of tidecache, an offline-capable request-interception cache engine.
//!
//! This crate provides:
//! - SQLite-backed versioned cache partitions
//! - Strategy selection and the four caching algorithms
//! - Version lifecycle, image eviction, and the control channel
//! - [`CacheEngine`] with its event dispatch table
//! - Unified error types and layered configuration

pub mod cache;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod eviction;
pub mod lifecycle;
pub mod network;
pub mod reconcile;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use cache::{CachedResponse, PartitionStore};
pub use config::{AppConfig, ConfigError};
pub use control::{ControlMessage, ControlReply, PreloadReport};
pub use engine::{CacheEngine, EngineConfig, Event, EventOutcome};
pub use error::Error;
pub use eviction::spawn_eviction_task;
pub use lifecycle::LifecycleState;
pub use network::{InterceptedRequest, Network};
pub use reconcile::ConnectivityEvent;
pub use strategy::{Resolved, ResponseSource, Strategy};
