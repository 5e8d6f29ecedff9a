//! Application context
//!
//! [`TenancyApp`] wires the registry, data layer, connection cache, resolver
//! and admin handlers together from one [`TenancyConfig`]. Nothing is global;
//! two apps in one process share no state.
//!
//! ```rust,ignore
//! let app = TenancyApp::new(TenancyConfig::load(&manager)?)?;
//! app.start().await;
//!
//! let mut chain = MiddlewareChain::new();
//! chain.use_middleware(app.middleware());
//!
//! // ... serve ...
//!
//! app.shutdown().await;
//! ```

use crate::TenancyError;
use crate::admin::TenantAdmin;
use crate::bootstrap::TenantProvisioner;
use crate::cache::ConnectionCache;
use crate::config::TenancyConfig;
use crate::degraded::DataLayer;
use crate::middleware::TenantMiddleware;
use crate::registry::{TenantRegistry, TenantStore};
use crate::resolver::TenantResolver;
use crate::store::RecordStore;
use orgspace_config::Validate;
use orgspace_core::{HealthIndicator, HealthReport, HealthService, ShutdownManager, ShutdownReport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

fn validate(config: &TenancyConfig) -> Result<(), TenancyError> {
    config
        .validate()
        .map_err(|e| TenancyError::Validation(format!("Invalid tenancy configuration: {}", e)))
}

/// Wired tenancy services
pub struct TenancyApp {
    config: TenancyConfig,
    registry: TenantRegistry,
    data: Arc<DataLayer>,
    cache: ConnectionCache<dyn RecordStore>,
    resolver: TenantResolver,
    health: HealthService,
    shutdown: ShutdownManager,
    hooks_registered: AtomicBool,
}

impl TenancyApp {
    /// Build with an in-memory tenant registry
    pub fn new(config: TenancyConfig) -> Result<Self, TenancyError> {
        Self::with_registry(config, TenantRegistry::in_memory())
    }

    /// Build over a caller-supplied tenant store
    pub fn with_store(config: TenancyConfig, store: Arc<dyn TenantStore>) -> Result<Self, TenancyError> {
        Self::with_registry(config, TenantRegistry::new(store))
    }

    fn with_registry(config: TenancyConfig, registry: TenantRegistry) -> Result<Self, TenancyError> {
        validate(&config)?;
        let data = Arc::new(DataLayer::initialize(&config.data)?);
        Ok(Self::assemble(config, registry, data))
    }

    /// Build over an already selected data layer
    pub fn with_data_layer(config: TenancyConfig, data: DataLayer) -> Result<Self, TenancyError> {
        validate(&config)?;
        Ok(Self::assemble(config, TenantRegistry::in_memory(), Arc::new(data)))
    }

    fn assemble(config: TenancyConfig, registry: TenantRegistry, data: Arc<DataLayer>) -> Self {
        let cache = ConnectionCache::new(data.connector(), registry.clone(), config.cache.clone());
        let resolver = TenantResolver::from_config(registry.clone(), &config.resolver);
        let health = HealthService::new()
            .with_indicator(Arc::clone(&data) as Arc<dyn HealthIndicator>)
            .with_indicator(Arc::new(cache.clone()));
        // drain_all waits once for in-flight creations and once for handle users
        let shutdown = ShutdownManager::new()
            .with_hook_timeout(config.cache.drain_timeout() * 2 + Duration::from_secs(1));

        info!(
            degraded = data.is_degraded(),
            resolver = ?resolver.strategy_names(),
            "Tenancy services assembled"
        );

        Self {
            config,
            registry,
            data,
            cache,
            resolver,
            health,
            shutdown,
            hooks_registered: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    pub fn data_layer(&self) -> &DataLayer {
        &self.data
    }

    pub fn cache(&self) -> &ConnectionCache<dyn RecordStore> {
        &self.cache
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    pub fn shutdown_manager(&self) -> &ShutdownManager {
        &self.shutdown
    }

    /// Tenant middleware honouring `resolver.required`
    pub fn middleware(&self) -> TenantMiddleware {
        TenantMiddleware::new(self.resolver.clone(), self.cache.clone())
            .with_required(self.config.resolver.required)
            .with_internal_errors(self.config.diagnostic_errors())
    }

    /// Tenant middleware that lets unidentified requests through
    pub fn optional_middleware(&self) -> TenantMiddleware {
        self.middleware().with_required(false)
    }

    pub fn admin(&self) -> TenantAdmin {
        TenantAdmin::new(self.registry.clone(), self.cache.clone(), self.health.clone())
            .with_internal_errors(self.config.diagnostic_errors())
    }

    pub fn provisioner(&self) -> TenantProvisioner {
        TenantProvisioner::new(self.registry.clone(), self.cache.clone())
    }

    pub async fn health(&self) -> HealthReport {
        self.health.check().await
    }

    async fn register_hooks(&self) {
        if self.hooks_registered.swap(true, Ordering::SeqCst) {
            return;
        }
        let cache = self.cache.clone();
        self.shutdown
            .add_hook(
                "connection-cache",
                Box::new(move || {
                    let cache = cache.clone();
                    Box::pin(async move {
                        cache.drain_all().await;
                        Ok(())
                    })
                }),
            )
            .await;
    }

    /// Register shutdown hooks and start the idle sweeper
    pub async fn start(&self) {
        self.register_hooks().await;
        self.cache.start_sweeper();
        info!(
            idle_ttl_secs = self.config.cache.idle_ttl_secs,
            sweep_interval_secs = self.config.cache.sweep_interval_secs,
            "Tenancy services started"
        );
    }

    /// Run shutdown hooks; the connection cache is drained. Runs once.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.register_hooks().await;
        self.shutdown.initiate_shutdown().await
    }
}
