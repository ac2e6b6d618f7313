//! Shared bearer-token cache.
//!
//! One async mutex per provider: the first caller fetches while holding it, and
//! everyone queued behind re-checks the cache before fetching again. Providers
//! never wait on each other.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AuthSettings, TokenFetcher};
use crate::config::ProviderConfig;
use crate::error::{ClearanceError, Result};

const MAX_TOKEN_LIFETIME_SECONDS: u64 = 365 * 24 * 3600;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct TokenCache {
    settings: HashMap<String, AuthSettings>,
    fetcher: Arc<dyn TokenFetcher>,
    tokens: DashMap<String, CachedToken>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenCache {
    pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            settings: HashMap::new(),
            fetcher,
            tokens: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    pub fn from_providers(providers: &[ProviderConfig], fetcher: Arc<dyn TokenFetcher>) -> Self {
        let mut cache = Self::new(fetcher);
        for provider in providers {
            cache.configure(&provider.code, provider.auth.clone());
        }
        cache
    }

    pub fn configure(&mut self, provider_code: &str, settings: AuthSettings) {
        self.settings.insert(Self::key(provider_code), settings);
    }

    /// Bearer token for the provider, or `None` when it needs no authentication
    pub async fn bearer_token(&self, provider_code: &str) -> Result<Option<String>> {
        let key = Self::key(provider_code);
        let settings = match self.settings.get(&key) {
            Some(settings) if settings.requires_authentication => settings,
            _ => return Ok(None),
        };

        if let Some(token) = self.cached(&key) {
            return Ok(Some(token));
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(token) = self.cached(&key) {
            debug!(provider = %provider_code, "Token fetched by a concurrent caller");
            return Ok(Some(token));
        }

        let fetched = self.fetcher.fetch(settings).await?;
        if fetched.access_token.trim().is_empty() {
            return Err(ClearanceError::AuthenticationError(format!(
                "No access token obtained for {provider_code}"
            )));
        }

        let lifetime = fetched
            .expires_in
            .saturating_sub(settings.expiration_buffer_seconds);
        let expires_at = Utc::now() + Duration::seconds(lifetime.min(MAX_TOKEN_LIFETIME_SECONDS) as i64);
        info!(provider = %provider_code, expires_at = %expires_at, "Cached new access token");

        self.tokens.insert(
            key,
            CachedToken {
                token: fetched.access_token.clone(),
                expires_at,
            },
        );
        Ok(Some(fetched.access_token))
    }

    /// Drop the cached token so the next call fetches a fresh one
    pub fn invalidate(&self, provider_code: &str) {
        if self.tokens.remove(&Self::key(provider_code)).is_some() {
            info!(provider = %provider_code, "Invalidated cached access token");
        }
    }

    pub fn has_cached_token(&self, provider_code: &str) -> bool {
        self.cached(&Self::key(provider_code)).is_some()
    }

    fn cached(&self, key: &str) -> Option<String> {
        self.tokens
            .get(key)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.token.clone())
    }

    fn key(provider_code: &str) -> String {
        provider_code.trim().to_ascii_uppercase()
    }
}
