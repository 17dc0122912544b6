//! Captured responses stored as cache entries.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Headers kept when a response is captured for the cache.
pub const STORED_HEADERS: &[&str] =
    &["content-type", "content-length", "date", "cache-control", "etag", "last-modified"];

/// A response as seen by the engine: captured from the network, read from a
/// partition, or synthesized for an offline condition.
///
/// Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl CachedResponse {
    /// Create a response with no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, headers: BTreeMap::new(), body: body.into() }
    }

    /// Plain-text response produced by the engine itself.
    pub fn synthetic(status: u16, text: &'static str) -> Self {
        Self::new(status, Bytes::from_static(text.as_bytes()))
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_header("content-length", text.len().to_string())
    }

    /// Builder-style header insert.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Drop every header not in [`STORED_HEADERS`].
    pub fn select_headers(mut self) -> Self {
        self.headers.retain(|name, _| STORED_HEADERS.contains(&name.as_str()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the status is in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Declared size from `content-length`; missing or unparseable counts as 0.
    pub fn declared_size(&self) -> u64 {
        declared_size(&self.headers)
    }

    /// Declared `date`; missing or unparseable sorts as the Unix epoch.
    pub fn declared_date(&self) -> DateTime<Utc> {
        declared_date(&self.headers)
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub(crate) fn declared_size(headers: &BTreeMap<String, String>) -> u64 {
    headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

pub(crate) fn declared_date(headers: &BTreeMap<String, String>) -> DateTime<Utc> {
    headers
        .get("date")
        .and_then(|v| DateTime::parse_from_rfc2822(v.trim()).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Format a timestamp as an HTTP date (IMF-fixdate).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_synthetic_response() {
        let resp = CachedResponse::synthetic(503, "Offline");
        assert_eq!(resp.status, 503);
        assert_eq!(resp.text(), "Offline");
        assert_eq!(resp.declared_size(), 7);
        assert!(!resp.is_ok());
    }

    #[test]
    fn test_select_headers() {
        let resp = CachedResponse::new(200, "x")
            .with_header("Content-Type", "text/css")
            .with_header("Set-Cookie", "a=b")
            .with_header("ETag", "\"1\"")
            .select_headers();
        assert_eq!(resp.header("content-type"), Some("text/css"));
        assert_eq!(resp.header("etag"), Some("\"1\""));
        assert!(resp.header("set-cookie").is_none());
    }

    #[test]
    fn test_declared_size_unparseable() {
        let resp = CachedResponse::new(200, "x").with_header("content-length", "lots");
        assert_eq!(resp.declared_size(), 0);
        assert_eq!(CachedResponse::new(200, "x").declared_size(), 0);
    }

    #[test]
    fn test_declared_date() {
        let resp = CachedResponse::new(200, "x").with_header("date", "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(resp.declared_date(), Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap());

        let missing = CachedResponse::new(200, "x");
        assert_eq!(missing.declared_date(), DateTime::<Utc>::UNIX_EPOCH);

        let garbage = CachedResponse::new(200, "x").with_header("date", "yesterday");
        assert_eq!(garbage.declared_date(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_http_date_roundtrip() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let resp = CachedResponse::new(200, "x").with_header("date", http_date(at));
        assert_eq!(resp.declared_date(), at);
    }
}
