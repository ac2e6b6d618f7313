//! # Configuration System
//!
//! YAML-based configuration with environment sections (`development`, `test`,
//! `production`) merged over the base document.
//!
//! ## Sections
//!
//! - `database`: connection settings for the PostgreSQL stores
//! - `scheduler`: cadence of the four periodic sweeps
//! - `runner`: error detail truncation and the fallback retry policy
//! - `resolver`: identifier suffixes and special fields collected into key bags
//! - `providers`: provider codes, protocol kind and OAuth settings
//! - `endpoints`: the static endpoint catalog
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clearance_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let cadence = manager.config().scheduler.status_poll_interval();
//! println!("status poll every {cadence:?}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::auth::AuthSettings;
use crate::models::{EndpointDefinition, RetryPolicy};
use crate::providers::ProtocolKind;
use crate::resolver::KeyBagRules;

/// Root configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClearanceConfig {
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub resolver: KeyBagRules,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/clearance_development".to_string(),
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }
}

/// Sweep cadences in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub pending_interval_seconds: u64,
    pub retry_interval_seconds: u64,
    pub status_poll_interval_seconds: u64,
    pub acknowledge_interval_seconds: u64,
    pub retry_batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pending_interval_seconds: 300,
            retry_interval_seconds: 300,
            status_poll_interval_seconds: 120,
            acknowledge_interval_seconds: 300,
            retry_batch_size: 200,
        }
    }
}

impl SchedulerConfig {
    pub fn pending_interval(&self) -> Duration {
        Duration::from_secs(self.pending_interval_seconds)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_seconds)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_seconds)
    }

    pub fn acknowledge_interval(&self) -> Duration {
        Duration::from_secs(self.acknowledge_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Each part of a logged error detail is cut to this many characters
    pub error_detail_max_chars: usize,
    /// Budget applied when the endpoint itself could not be loaded
    pub fallback_retry: RetryPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            error_detail_max_chars: 4000,
            fallback_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub code: String,
    pub protocol: ProtocolKind,
    #[serde(default)]
    pub auth: AuthSettings,
}

impl ClearanceConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "url",
                "database",
            ));
        }

        let mut codes = HashSet::new();
        for provider in &self.providers {
            let code = provider.code.trim().to_ascii_uppercase();
            if code.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "code",
                    "providers",
                ));
            }
            if !codes.insert(code) {
                return Err(ConfigurationError::DuplicateProvider {
                    code: provider.code.clone(),
                });
            }
            if provider.auth.requires_authentication && provider.auth.token_url.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "auth.token_url",
                    format!("provider {}", provider.code),
                ));
            }
        }

        for endpoint in &self.endpoints {
            if !codes.contains(&endpoint.provider_code.trim().to_ascii_uppercase()) {
                return Err(ConfigurationError::UnknownProvider {
                    provider_code: endpoint.provider_code.clone(),
                    operation: endpoint.operation_code.to_string(),
                });
            }
            if endpoint.timeout_seconds <= 0 {
                return Err(ConfigurationError::invalid_value(
                    "endpoints.timeout_seconds",
                    endpoint.timeout_seconds.to_string(),
                    format!(
                        "timeout must be positive for {}/{}",
                        endpoint.provider_code, endpoint.operation_code
                    ),
                ));
            }
        }

        if self.scheduler.retry_batch_size <= 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.retry_batch_size",
                self.scheduler.retry_batch_size.to_string(),
                "batch size must be positive",
            ));
        }

        Ok(())
    }
}
