//! # Engine Assembly
//!
//! Wires stores, catalog, provider registry, token cache, transport and renderer
//! into a runner, the sweeps and the caller-facing manager.
//!
//! ```rust,no_run
//! use clearance_core::config::ConfigManager;
//! use clearance_core::engine::ClearanceEngine;
//! use clearance_core::store::{MemoryStore, StaticEndpointCatalog};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//! let engine = ClearanceEngine::builder(config)
//!     .with_backend(Arc::new(MemoryStore::new()))
//!     .with_catalog(Arc::new(StaticEndpointCatalog::new(config.endpoints.clone())))
//!     .build()?;
//! let invocation_id = engine.manager().create_invocation(7, 3, "MEDX").await?;
//! # let _ = invocation_id;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::info;

use crate::auth::{ClientCredentialsFetcher, TokenCache, TokenFetcher};
use crate::composer::RequestComposer;
use crate::config::ClearanceConfig;
use crate::error::{ClearanceError, Result};
use crate::interpreter::ResponseInterpreter;
use crate::manager::ClearanceManager;
use crate::providers::ProviderRegistry;
use crate::rendering::{HandlebarsRenderer, PayloadRenderer};
use crate::resolver::ContextResolver;
use crate::runner::{InvocationRunner, RunnerDeps};
use crate::scheduler::{ClearanceSweeps, ExecutionMode, ExecutionQueue, PeriodicScheduler};
use crate::store::{
    ClearanceLinkStore, ClearanceStore, EndpointCatalog, InvocationLogStore, InvocationStore,
    StaticEndpointCatalog, Stores, SubjectDirectory,
};
use crate::transport::{HttpTransport, ReqwestTransport};

pub struct ClearanceEngine {
    config: ClearanceConfig,
    stores: Stores,
    providers: Arc<ProviderRegistry>,
    tokens: Arc<TokenCache>,
    runner: Arc<InvocationRunner>,
    sweeps: Arc<ClearanceSweeps>,
    manager: Arc<ClearanceManager>,
}

impl std::fmt::Debug for ClearanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClearanceEngine")
            .field("environment", &self.config.environment)
            .field("providers", &self.providers.provider_codes())
            .finish_non_exhaustive()
    }
}

impl ClearanceEngine {
    pub fn builder(config: &ClearanceConfig) -> EngineBuilder {
        EngineBuilder::new(config.clone())
    }

    pub fn config(&self) -> &ClearanceConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    pub fn runner(&self) -> &Arc<InvocationRunner> {
        &self.runner
    }

    pub fn sweeps(&self) -> &Arc<ClearanceSweeps> {
        &self.sweeps
    }

    pub fn manager(&self) -> &Arc<ClearanceManager> {
        &self.manager
    }

    pub fn scheduler(&self) -> PeriodicScheduler {
        PeriodicScheduler::new(self.sweeps.clone(), self.config.scheduler.clone())
    }
}

pub struct EngineBuilder {
    config: ClearanceConfig,
    stores: Option<Stores>,
    catalog: Option<Arc<dyn EndpointCatalog>>,
    transport: Option<Arc<dyn HttpTransport>>,
    fetcher: Option<Arc<dyn TokenFetcher>>,
    renderer: Option<Arc<dyn PayloadRenderer>>,
    mode: ExecutionMode,
}

impl EngineBuilder {
    fn new(config: ClearanceConfig) -> Self {
        Self {
            config,
            stores: None,
            catalog: None,
            transport: None,
            fetcher: None,
            renderer: None,
            mode: ExecutionMode::Inline,
        }
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// One backend for every store
    pub fn with_backend<B>(self, backend: Arc<B>) -> Self
    where
        B: InvocationStore
            + InvocationLogStore
            + ClearanceStore
            + ClearanceLinkStore
            + SubjectDirectory
            + 'static,
    {
        self.with_stores(Stores::from_backend(backend))
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn EndpointCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_token_fetcher(mut self, fetcher: Arc<dyn TokenFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PayloadRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<ClearanceEngine> {
        self.config.validate()?;
        let config = self.config;

        let stores = self.stores.ok_or_else(|| {
            ClearanceError::ConfigurationError("Engine needs a storage backend".to_string())
        })?;
        let catalog: Arc<dyn EndpointCatalog> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(StaticEndpointCatalog::new(config.endpoints.clone())),
        };
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let fetcher: Arc<dyn TokenFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ClientCredentialsFetcher::new()?),
        };
        let renderer: Arc<dyn PayloadRenderer> = self
            .renderer
            .unwrap_or_else(|| Arc::new(HandlebarsRenderer::new()));

        let providers = Arc::new(ProviderRegistry::from_config(&config.providers));
        let tokens = Arc::new(TokenCache::from_providers(&config.providers, fetcher));
        let resolver = Arc::new(ContextResolver::new(
            stores.clone(),
            catalog.clone(),
            providers.clone(),
            config.resolver.clone(),
        ));
        let composer = Arc::new(RequestComposer::new(
            stores.clone(),
            catalog.clone(),
            providers.clone(),
        ));
        let interpreter = Arc::new(ResponseInterpreter::new(stores.clone(), providers.clone()));

        let runner = Arc::new(InvocationRunner::new(
            RunnerDeps {
                stores: stores.clone(),
                catalog: catalog.clone(),
                resolver: resolver.clone(),
                composer,
                renderer,
                transport,
                tokens: tokens.clone(),
                interpreter,
            },
            config.runner.clone(),
        ));
        let sweeps = Arc::new(ClearanceSweeps::new(
            stores.clone(),
            catalog,
            providers.clone(),
            resolver,
            ExecutionQueue::new(runner.clone(), self.mode),
            config.scheduler.retry_batch_size,
        ));
        let manager = Arc::new(ClearanceManager::new(stores.clone(), sweeps.clone()));

        let stats = providers.stats();
        info!(
            providers = stats.total_providers,
            acknowledged = stats.acknowledged,
            batched = stats.batched,
            mode = ?self.mode,
            "Clearance engine assembled"
        );

        Ok(ClearanceEngine {
            config,
            stores,
            providers,
            tokens,
            runner,
            sweeps,
            manager,
        })
    }
}
