//! SQLite-backed partition store for captured responses.
//!
//! This module provides named, versioned partitions of request→response
//! entries using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Idempotent partition open, last-write-wins puts, atomic bulk puts
//! - Lookup within one partition or across every partition
//! - Canonical request keys with volatile query parameters stripped
//! - Role resolution and `{role}-{variant}-v{semver}` partition naming

pub mod connection;
pub mod entry;
pub mod hash;
pub mod key;
pub mod migrations;
pub mod naming;
pub mod partition;

pub use crate::Error;

pub use connection::PartitionStore;
pub use entry::{CachedResponse, STORED_HEADERS, http_date};
pub use key::{VolatileParams, canonicalize, request_key};
pub use naming::{PartitionName, Role, VersionedPartitions};
pub use partition::{EntryMeta, Partition};
