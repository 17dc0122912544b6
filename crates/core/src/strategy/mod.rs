//! Request classification and the four caching algorithms.
//!
//! ### Strategies
//! - **cache-first**: role partition, then network with write-back; offline → 503.
//! - **network-first**: network with write-back, then any partition, then the
//!   offline document for navigations; otherwise 503.
//! - **stale-while-revalidate**: cached copy immediately plus a detached
//!   refresh; the caller awaits the network only when nothing is cached.
//! - **cache-only**: any partition, else 404; never touches the network.
//!
//! Every path ends in a real, cached, or synthetic response.

mod executor;
pub mod rules;

use serde::{Deserialize, Serialize};

pub use executor::{NETWORK_ERROR_BODY, NOT_IN_CACHE_BODY, OFFLINE_BODY, Resolved, ResponseSource};
pub use rules::{BypassReason, Pattern, Route, RuleSet, StrategyRule};

/// Caching algorithm applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    CacheOnly,
}

impl Strategy {
    /// Evaluation priority; lower runs first.
    pub fn priority(self) -> u8 {
        match self {
            Strategy::CacheFirst => 0,
            Strategy::NetworkFirst => 1,
            Strategy::StaleWhileRevalidate => 2,
            Strategy::CacheOnly => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
            Strategy::CacheOnly => "cache-only",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
