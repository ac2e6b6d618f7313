//! # Outbound Transport
//!
//! One HTTP call per attempt, never retried inside the attempt. Transport
//! failures are folded into the response: a timeout becomes status 408, any other
//! failure status 0, so the runner classifies everything the same way.

pub mod reqwest_transport;

use async_trait::async_trait;
use std::time::Duration;

pub use reqwest_transport::ReqwestTransport;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Status recorded when the attempt timed out
pub const STATUS_TIMEOUT: u16 = 408;
/// Status recorded when no HTTP response was received at all
pub const STATUS_NO_RESPONSE: u16 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl OutboundRequest {
    pub fn new(method: &str, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: method.trim().to_ascii_uppercase(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn with_body(mut self, body: Option<String>) -> Self {
        self.body = body.filter(|body| !body.is_empty());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Explicit Content-Type header, else detected from the body
    pub fn content_type(&self) -> Option<String> {
        if let Some(explicit) = self.header("Content-Type") {
            return Some(explicit.to_string());
        }
        self.body
            .as_deref()
            .map(|body| detect_content_type(body).to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: String,
    pub elapsed_ms: i64,
    /// Transport-level failure text, when there was no usable HTTP exchange
    pub error: Option<String>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn timed_out(timeout: Duration, elapsed_ms: i64) -> Self {
        Self {
            status_code: STATUS_TIMEOUT,
            body: String::new(),
            elapsed_ms,
            error: Some(format!(
                "Request canceled or timed out after {} seconds",
                timeout.as_secs()
            )),
        }
    }

    pub fn failed(error: impl Into<String>, elapsed_ms: i64) -> Self {
        Self {
            status_code: STATUS_NO_RESPONSE,
            body: String::new(),
            elapsed_ms,
            error: Some(error.into()),
        }
    }
}

/// Form bodies are recognised by `grant_type=` or by `key=value&...` shape
pub fn detect_content_type(body: &str) -> &'static str {
    let trimmed = body.trim_start();
    if body.contains("grant_type=")
        || (body.contains('=') && body.contains('&') && !trimmed.starts_with('{'))
    {
        CONTENT_TYPE_FORM
    } else {
        CONTENT_TYPE_JSON
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> TransportResponse;
}
