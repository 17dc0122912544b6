//! HTTP network layer for the cache engine.
//!
//! ### Request forwarding
//! - Method, URL, `Accept`, and body are forwarded as intercepted
//! - Max redirects: 5
//! - Every round trip is bounded by the engine timeout
//!
//! ### Captured responses
//! - Any status is returned; only transport failures are errors
//! - Headers are reduced to the stored set
//! - `content-length` is filled from the decoded body and `date` from the
//!   clock when the origin omitted them

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::{Client, Method, header};

use tidecache_core::cache::http_date;
use tidecache_core::{AppConfig, CachedResponse, Error, InterceptedRequest, Network};

/// Configuration for the HTTP network layer.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "tidecache/0.1")
    pub user_agent: String,

    /// Deadline for one complete round trip, body included (default: 15s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "tidecache/0.1".to_string(), timeout: Duration::from_millis(15000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Self::default() }
    }
}

/// reqwest-backed [`Network`].
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

fn transport_error(e: &reqwest::Error) -> Error {
    if e.is_timeout() { Error::FetchTimeout(e.to_string()) } else { Error::Network(e.to_string()) }
}

fn capture_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

impl HttpNetwork {
    /// Create a network layer with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn round_trip(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("method {}: {}", request.method, e)))?;

        let mut builder = self.http.request(method, request.url.clone());
        if let Some(accept) = &request.accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status().as_u16();
        let headers = capture_headers(response.headers());
        let body = response.bytes().await.map_err(|e| transport_error(&e))?;

        Ok(fill_missing_headers(CachedResponse { status, headers, body }.select_headers()))
    }
}

/// Fill `content-length` from the body and `date` from the clock when the
/// origin left them out.
fn fill_missing_headers(mut captured: CachedResponse) -> CachedResponse {
    if captured.header("content-length").is_none() {
        let len = captured.body.len().to_string();
        captured = captured.with_header("content-length", len);
    }
    if captured.header("date").is_none() {
        captured = captured.with_header("date", http_date(Utc::now()));
    }
    captured
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<CachedResponse, Error> {
        let start = Instant::now();
        let response = tokio::time::timeout(self.config.timeout, self.round_trip(request))
            .await
            .map_err(|_| Error::FetchTimeout(format!("{} after {:?}", request.url, self.config.timeout)))??;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            response.status,
            start.elapsed().as_millis(),
            response.body.len()
        );
        Ok(response)
    }
}
