use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::time::Instant;
use tracing::{debug, warn};

use super::{HttpTransport, OutboundRequest, TransportResponse};
use crate::error::{ClearanceError, Result};

/// [`HttpTransport`] over a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClearanceError::TransportError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> TransportResponse {
        let started = Instant::now();
        let elapsed_ms = |started: Instant| started.elapsed().as_millis() as i64;

        let method = match Method::from_bytes(request.method.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return TransportResponse::failed(
                    format!("Unsupported HTTP method: {}", request.method),
                    0,
                )
            }
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout)
            .header("Accept", "application/json");

        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => warn!(header = %name, "Skipping invalid header"),
            }
        }

        if let Some(body) = &request.body {
            if request.header("Content-Type").is_none() {
                if let Some(content_type) = request.content_type() {
                    builder = builder.header(CONTENT_TYPE, content_type);
                }
            }
            builder = builder.body(body.clone());
        }

        match builder.send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) if e.is_timeout() => {
                        return TransportResponse::timed_out(request.timeout, elapsed_ms(started))
                    }
                    Err(e) => {
                        return TransportResponse {
                            status_code,
                            body: String::new(),
                            elapsed_ms: elapsed_ms(started),
                            error: Some(format!("Failed to read response body: {e}")),
                        }
                    }
                };
                debug!(url = %request.url, status_code, "Provider responded");
                TransportResponse {
                    status_code,
                    body,
                    elapsed_ms: elapsed_ms(started),
                    error: None,
                }
            }
            Err(e) if e.is_timeout() => {
                warn!(url = %request.url, "Provider call timed out");
                TransportResponse::timed_out(request.timeout, elapsed_ms(started))
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Provider call failed");
                TransportResponse::failed(e.to_string(), elapsed_ms(started))
            }
        }
    }
}
