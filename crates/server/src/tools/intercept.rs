//! intercept tool implementation.
//!
//! Routes one request through the engine and reports the response together
//! with where it came from.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidecache_core::{CacheEngine, Error, Event, EventOutcome, InterceptedRequest, ResponseSource, Strategy};

use super::json_result;

/// Input parameters for the intercept tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct InterceptParams {
    /// Absolute URL, or a path relative to the engine origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Treat the request as a full-document navigation.
    #[serde(default)]
    pub navigate: bool,

    /// Optional Accept header.
    #[serde(default)]
    pub accept: Option<String>,

    /// Optional request body, forwarded on bypass.
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Output structure for the intercept tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterceptOutput {
    /// Canonical cache key of the request.
    pub key: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub source: ResponseSource,
    /// Strategy applied; absent for bypassed requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
}

/// Implementation of the intercept tool.
pub async fn intercept_impl(engine: &CacheEngine, params: InterceptParams) -> Result<CallToolResult, McpError> {
    let url = engine.resolve_url(&params.url)?;
    let method = params.method.trim();
    if method.is_empty() {
        return Err(Error::InvalidInput("method cannot be empty".into()).into());
    }

    let mut request = InterceptedRequest::new(method, url);
    if params.navigate {
        request = InterceptedRequest { navigate: true, ..request }.with_accept("text/html");
    }
    if let Some(accept) = params.accept {
        request = request.with_accept(accept);
    }
    if let Some(body) = params.body {
        request = request.with_body(body);
    }
    let key = engine.request_key(&request);

    let EventOutcome::Response(resolved) = engine.dispatch(Event::Fetch(request)).await? else {
        return Err(Error::UnhandledEvent("fetch handler returned no response".into()).into());
    };

    json_result(&InterceptOutput {
        key,
        status: resolved.response.status,
        body: resolved.response.text(),
        headers: resolved.response.headers,
        source: resolved.source,
        strategy: resolved.strategy,
    })
}
