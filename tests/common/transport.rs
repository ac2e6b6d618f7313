use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clearance_core::auth::{AccessToken, AuthSettings, TokenFetcher};
use clearance_core::error::Result;
use clearance_core::transport::{HttpTransport, OutboundRequest, TransportResponse};

/// Replays queued responses in order and records every request. An empty
/// queue answers 500.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    sent: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status_code: u16, body: &str) {
        self.responses.lock().push_back(TransportResponse {
            status_code,
            body: body.to_string(),
            elapsed_ms: 5,
            error: None,
        });
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> TransportResponse {
        self.sent.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| TransportResponse {
                status_code: 500,
                body: String::new(),
                elapsed_ms: 5,
                error: Some("no scripted response".to_string()),
            })
    }
}

pub struct StaticTokenFetcher {
    token: String,
    pub calls: AtomicUsize,
}

impl StaticTokenFetcher {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TokenFetcher for StaticTokenFetcher {
    async fn fetch(&self, _settings: &AuthSettings) -> Result<AccessToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken {
            access_token: format!("{}-{n}", self.token),
            expires_in: 3600,
            token_type: Some("Bearer".to_string()),
        })
    }
}
