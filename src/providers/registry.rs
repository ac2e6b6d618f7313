//! Provider code to protocol mapping, fixed at startup.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ProtocolKind, ProviderProtocol};
use crate::config::ProviderConfig;

/// Registry statistics
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryStats {
    pub total_providers: usize,
    pub acknowledged: usize,
    pub batched: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    protocols: HashMap<String, Arc<dyn ProviderProtocol>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(providers: &[ProviderConfig]) -> Self {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(&provider.code, provider.protocol);
        }
        registry
    }

    pub fn register(&mut self, provider_code: &str, kind: ProtocolKind) {
        debug!(provider = %provider_code, protocol = %kind, "Registering provider protocol");
        self.protocols
            .insert(Self::key(provider_code), kind.protocol());
    }

    /// Protocol for `provider_code`; unknown codes are logged and yield `None`
    pub fn get(&self, provider_code: &str) -> Option<Arc<dyn ProviderProtocol>> {
        let protocol = self.protocols.get(&Self::key(provider_code)).cloned();
        if protocol.is_none() {
            warn!(provider = %provider_code, "No protocol registered for provider");
        }
        protocol
    }

    pub fn contains(&self, provider_code: &str) -> bool {
        self.protocols.contains_key(&Self::key(provider_code))
    }

    pub fn provider_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.protocols.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn stats(&self) -> RegistryStats {
        let count = |kind: ProtocolKind| {
            self.protocols
                .values()
                .filter(|protocol| protocol.kind() == kind)
                .count()
        };
        RegistryStats {
            total_providers: self.protocols.len(),
            acknowledged: count(ProtocolKind::Acknowledged),
            batched: count(ProtocolKind::Batched),
        }
    }

    fn key(provider_code: &str) -> String {
        provider_code.trim().to_ascii_uppercase()
    }
}
