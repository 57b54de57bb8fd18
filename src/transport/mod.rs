//! HTTP transport: executes one [`ApiRequest`](crate::request::ApiRequest)
//! against the network and hands back the raw response.
//!
//! No business-logic interpretation of the body happens here; status,
//! headers and body bytes pass through untouched. Network-level failures
//! (timeout, DNS, connection refused) surface as [`TransportError`],
//! distinguishable from a successful-but-non-2xx HTTP response.

use bytes::Bytes;
use reqwest::Proxy;
use std::collections::HashMap;
use std::env;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::request::{ApiRequest, RequestBody};
use crate::Result;

/// Transport-level error, distinct from non-2xx HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Raw response as received from the wire.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Content-Type` header value, if present (header names are lowercased
    /// at capture time).
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Echo form for diagnostics: status, content type and the body rendered
    /// as text (truncated to keep error payloads bounded).
    pub fn echo(&self) -> serde_json::Value {
        let mut body = self.body_text();
        if body.len() > 4096 {
            body.truncate(4096);
        }
        serde_json::json!({
            "status": self.status,
            "content_type": self.content_type(),
            "body": body,
        })
    }
}

/// Pooled HTTP client. One instance is shared across a pipeline's runs,
/// including token requests and child-request cycles.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Production-friendly defaults, env-overridable.
        let timeout_secs = env::var("SR_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("SR_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("SR_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("SR_HTTP_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client })
    }

    /// Execute one request descriptor. The descriptor is consumed by value;
    /// it is never mutated after being handed over.
    pub async fn execute(&self, request: ApiRequest) -> Result<RawResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::Other(format!("invalid method '{}'", request.method)))?;

        let mut req = self.client.request(method, &request.url);

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        match &request.body {
            RequestBody::None => {}
            RequestBody::Json(value) => req = req.json(value),
            RequestBody::Form(fields) => req = req.form(fields),
        }

        let start = Instant::now();
        let response = req.send().await.map_err(TransportError::Http)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_ascii_lowercase(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(TransportError::Http)?;

        debug!(
            run_id = request.run_id.as_str(),
            url = request.url.as_str(),
            http_status = status,
            body_bytes = body.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "request executed"
        );

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
