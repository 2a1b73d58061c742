//! Builder for a fully-wired [`EmbeddedRouter`].
//!
//! A plain field-setter builder whose `.build()` assembles the concrete
//! collaborators (registry, state store, circuit breaker, rate limiter,
//! selector, router) instead of leaving the caller to wire them by hand.

use std::sync::Arc;

use super::EmbeddedRouter;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{Config, StateBackendKind};
use crate::provider::ChatProvider;
use crate::rate_limit::RateLimiter;
use crate::registry::ModelRegistry;
use crate::router::{ProviderMap, Router};
use crate::selector::Selector;
use crate::state::http::HttpStateStore;
use crate::state::memory::MemoryStateStore;
use crate::state::StateStore;
#[cfg(feature = "state-tcp")]
use crate::state::tcp::TcpStateStore;
use crate::{Result, RouterError};

/// Builder for configuring and assembling a [`EmbeddedRouter`].
pub struct RouterBuilder {
    config: Config,
    providers: ProviderMap,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self { config: Config::default(), providers: ProviderMap::new() }
    }

    /// Use an already-loaded configuration instead of defaults.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Register a provider adapter under the name referenced by
    /// `ModelDefinition.provider` in the catalog (e.g. `"openrouter"`).
    pub fn provider(mut self, name: impl Into<String>, adapter: Arc<dyn ChatProvider>) -> Self {
        self.providers.insert(name, adapter);
        self
    }

    async fn build_state_store(&self, stats_window_ms: u64) -> Result<Arc<dyn StateStore>> {
        let backend = &self.config.state_backend;
        let store: Arc<dyn StateStore> = match backend.kind {
            StateBackendKind::Memory => {
                let mem = Arc::new(MemoryStateStore::new());
                mem.spawn_cleanup(stats_window_ms, std::time::Duration::from_secs(60));
                mem
            }
            #[cfg(feature = "state-tcp")]
            StateBackendKind::Tcp => {
                let url = backend.url.as_deref().ok_or_else(|| {
                    RouterError::Configuration("state_backend.url required for tcp backend".into())
                })?;
                Arc::new(TcpStateStore::connect(url).await?)
            }
            #[cfg(not(feature = "state-tcp"))]
            StateBackendKind::Tcp => {
                return Err(RouterError::Configuration(
                    "tcp state backend selected but the `state-tcp` feature is not enabled".into(),
                ));
            }
            StateBackendKind::Http => {
                let url = backend.url.as_deref().ok_or_else(|| {
                    RouterError::Configuration("state_backend.url required for http backend".into())
                })?;
                Arc::new(HttpStateStore::new(url, backend.token.as_deref())?)
            }
        };
        store.init().await?;
        Ok(store)
    }

    /// Acquire the catalog, apply overrides, and build every collaborator.
    pub async fn build(self) -> Result<EmbeddedRouter> {
        let stats_window_ms = self.config.circuit_breaker.stats_window_size_mins * 60 * 1_000;
        let store = self.build_state_store(stats_window_ms).await?;
        let registry_config = self.config.registry.clone().into_registry_config()?;
        let registry = Arc::new(ModelRegistry::load(&registry_config).await?);
        let breaker =
            Arc::new(CircuitBreaker::new(store.clone(), self.config.circuit_breaker.clone()));
        let limiter = Arc::new(RateLimiter::new(store.clone(), self.config.rate_limiter));
        let selector =
            Arc::new(Selector::new(registry.clone(), breaker.clone(), store.clone(), stats_window_ms));

        let router = Router::new(
            registry,
            store.clone(),
            breaker,
            limiter,
            selector,
            Arc::new(self.providers),
            self.config.routing,
        );

        Ok(EmbeddedRouter::new(router, store))
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
