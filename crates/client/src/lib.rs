//! Network layer for tidecache.
//!
//! This crate provides the reqwest-backed implementation of the engine's
//! [`Network`](tidecache_core::Network) seam used by the server.

pub mod fetch;

pub use fetch::{FetchConfig, HttpNetwork};
