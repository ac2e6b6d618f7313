//! # Provider Authentication
//!
//! OAuth client-credentials tokens for providers that require a bearer token.
//! Tokens are fetched by a [`TokenFetcher`] and held in the shared [`TokenCache`].

pub mod client_credentials;
pub mod token_cache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use client_credentials::ClientCredentialsFetcher;
pub use token_cache::TokenCache;

/// Lifetime assumed when the token endpoint does not say
pub const DEFAULT_EXPIRES_IN_SECONDS: u64 = 3599;

/// Per-provider OAuth settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub requires_authentication: bool,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
    /// Tokens are dropped this many seconds before they actually expire
    pub expiration_buffer_seconds: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            requires_authentication: false,
            token_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: None,
            expiration_buffer_seconds: 60,
        }
    }
}

/// Token endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECONDS
}

#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self, settings: &AuthSettings) -> Result<AccessToken>;
}

/// Whether a 400 body looks like a token problem rather than a payload problem
pub fn is_auth_error_body(body: &str) -> bool {
    const MARKERS: &[&str] = &[
        "invalid_token",
        "token_expired",
        "expired_token",
        "unauthorized",
        "access_denied",
        "authentication",
    ];
    let lower = body.to_ascii_lowercase();
    MARKERS.iter().any(|marker| lower.contains(marker))
}
