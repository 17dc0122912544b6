//! Request canonicalization for cache keys.
//!
//! Two requests share an entry when their method and canonical URL agree.
//! Canonicalization lowercases the host, drops the fragment, and strips
//! volatile query parameters (cache busters, tracking tags) while keeping the
//! remaining parameters in their original order.

use url::Url;

/// Query parameters that never take part in request identity.
///
/// An entry ending in `*` matches any parameter with that prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolatileParams {
    patterns: Vec<String>,
}

impl VolatileParams {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { patterns: patterns.into_iter().map(Into::into).collect() }
    }

    pub fn is_volatile(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| match p.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == p,
        })
    }
}

impl Default for VolatileParams {
    fn default() -> Self {
        Self::new(default_volatile_params())
    }
}

pub fn default_volatile_params() -> Vec<String> {
    ["_", "t", "ts", "timestamp", "cb", "utm_*", "fbclid", "gclid"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Canonical form of a request URL for cache identity.
pub fn canonicalize(url: &Url, volatile: &VolatileParams) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            // Lowercasing a host that already parsed cannot make it invalid.
            let _ = canonical.set_host(Some(&lowered));
        }
    }

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| !volatile.is_volatile(name))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            canonical.set_query(None);
        } else {
            canonical.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    canonical
}

/// Cache key for a request: `"{METHOD} {canonical-url}"`.
pub fn request_key(method: &str, url: &Url, volatile: &VolatileParams) -> String {
    format!("{} {}", method.to_ascii_uppercase(), canonicalize(url, volatile))
}
