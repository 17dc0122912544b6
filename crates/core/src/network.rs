//! The network seam between the engine and the outside world.
//!
//! The engine never talks to a socket itself; it hands requests to a
//! [`Network`] implementation. The production implementation lives in the
//! client crate; tests substitute scripted doubles.

use bytes::Bytes;
use url::Url;

use crate::Error;
use crate::cache::CachedResponse;

/// A request captured by the interception layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    /// Uppercase HTTP method.
    pub method: String,
    pub url: Url,
    /// Full-document navigation (as opposed to a subresource fetch).
    pub navigate: bool,
    /// `Accept` header, used for role resolution when the URL has no extension.
    pub accept: Option<String>,
    /// Request body, forwarded untouched on bypass.
    pub body: Option<Bytes>,
}

impl InterceptedRequest {
    pub fn new(method: &str, url: Url) -> Self {
        Self { method: method.to_ascii_uppercase(), url, navigate: false, accept: None, body: None }
    }

    /// Subresource GET.
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// Full-document navigation GET.
    pub fn navigation(url: Url) -> Self {
        Self { navigate: true, accept: Some("text/html".into()), ..Self::get(url) }
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// Performs network round trips for the engine.
///
/// Implementations resolve with whatever response the server sent, including
/// non-2xx statuses. Only transport failures (refused connection, DNS,
/// timeout) are errors, reported as `Error::Network` or `Error::FetchTimeout`.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error>;
}
