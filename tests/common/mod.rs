#![allow(dead_code)]

pub mod builders;
pub mod strategies;
pub mod transport;

pub use builders::*;
pub use transport::*;

use std::sync::Arc;

use clearance_core::config::{ClearanceConfig, ProviderConfig};
use clearance_core::engine::ClearanceEngine;
use clearance_core::models::EndpointDefinition;
use clearance_core::store::{MemoryStore, StaticEndpointCatalog};

/// In-memory engine with a scripted provider behind it
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<StaticEndpointCatalog>,
    pub transport: Arc<ScriptedTransport>,
    pub engine: ClearanceEngine,
}

impl Harness {
    pub fn new(providers: Vec<ProviderConfig>, endpoints: Vec<EndpointDefinition>) -> Self {
        Self::on_store(Arc::new(MemoryStore::new()), providers, endpoints)
    }

    /// A fresh engine over rows an earlier engine left behind
    pub fn on_store(
        store: Arc<MemoryStore>,
        providers: Vec<ProviderConfig>,
        endpoints: Vec<EndpointDefinition>,
    ) -> Self {
        let catalog = Arc::new(StaticEndpointCatalog::new(endpoints));
        let transport = ScriptedTransport::new();
        let config = ClearanceConfig {
            environment: "test".to_string(),
            providers,
            ..ClearanceConfig::default()
        };

        let engine = ClearanceEngine::builder(&config)
            .with_backend(store.clone())
            .with_catalog(catalog.clone())
            .with_transport(transport.clone())
            .with_token_fetcher(Arc::new(StaticTokenFetcher::new("test-token")))
            .build()
            .expect("engine should assemble");

        Self {
            store,
            catalog,
            transport,
            engine,
        }
    }
}
