//! Degraded-mode fallback
//!
//! When the live backend cannot be built the service keeps running on
//! [`DegradedStore`]: reads come back empty, writes fail with
//! [`TenancyError::Degraded`], probes succeed. [`DataLayer`] makes the
//! choice once, at startup, from [`DataConfig`].

use crate::TenancyError;
use crate::cache::ConnectionFactory;
use crate::config::{DataConfig, DataMode};
use crate::store::{Filter, MemoryConnector, MemoryDatabase, RawOutcome, RawStatement, RecordStore, Row};
use crate::tenant::Tenant;
use async_trait::async_trait;
use orgspace_core::{HealthCheckResult, HealthIndicator};
use std::sync::Arc;
use tracing::{info, warn};

const DEGRADED_DATABASE: &str = "degraded";

/// Stand-in handle used when no live store is available
#[derive(Debug, Clone)]
pub struct DegradedStore {
    cause: String,
}

impl DegradedStore {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }

    fn refuse(&self) -> TenancyError {
        TenancyError::Degraded(format!("Data store unavailable: {}", self.cause))
    }
}

#[async_trait]
impl RecordStore for DegradedStore {
    fn database(&self) -> &str {
        DEGRADED_DATABASE
    }

    async fn insert(&self, _table: &str, _record: Row) -> Result<Row, TenancyError> {
        Err(self.refuse())
    }

    async fn select(
        &self,
        _table: &str,
        _filter: &Filter,
        _limit: Option<usize>,
    ) -> Result<Vec<Row>, TenancyError> {
        Ok(Vec::new())
    }

    async fn update(
        &self,
        _table: &str,
        _filter: &Filter,
        _patch: Row,
    ) -> Result<Vec<Row>, TenancyError> {
        Err(self.refuse())
    }

    async fn delete(&self, _table: &str, _filter: &Filter) -> Result<usize, TenancyError> {
        Err(self.refuse())
    }

    async fn count(&self, _table: &str, _filter: &Filter) -> Result<usize, TenancyError> {
        Ok(0)
    }

    async fn raw(&self, statement: &RawStatement) -> Result<RawOutcome, TenancyError> {
        match statement {
            RawStatement::Scan { .. } | RawStatement::Tables => Ok(RawOutcome::default()),
            RawStatement::Purge { .. } => Err(self.refuse()),
        }
    }

    async fn ping(&self) -> Result<(), TenancyError> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Hands out a fresh [`DegradedStore`] per tenant
pub struct DegradedConnector {
    cause: String,
}

impl DegradedConnector {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for DegradedConnector {
    type Handle = dyn RecordStore;

    async fn connect(&self, _tenant: &Tenant) -> Result<Arc<Self::Handle>, TenancyError> {
        Ok(Arc::new(DegradedStore::new(self.cause.clone())))
    }

    async fn probe(&self, handle: &Self::Handle) -> Result<(), TenancyError> {
        handle.ping().await
    }

    async fn dispose(&self, handle: &Self::Handle) {
        handle.close().await;
    }
}

/// The data backend selected at startup
pub struct DataLayer {
    connector: Arc<dyn ConnectionFactory<Handle = dyn RecordStore>>,
    engine: Option<Arc<MemoryDatabase>>,
    degraded_cause: Option<String>,
}

impl DataLayer {
    /// Select live or degraded according to `config.mode`.
    ///
    /// `live` returns the construction error; `auto` logs it and falls back.
    pub fn initialize(config: &DataConfig) -> Result<Self, TenancyError> {
        match config.mode {
            DataMode::Live => Self::build_live(config),
            DataMode::Degraded => {
                let layer = Self::degraded("Degraded mode forced by configuration");
                warn!("Data layer running in degraded mode (forced by configuration)");
                Ok(layer)
            }
            DataMode::Auto => match Self::build_live(config) {
                Ok(layer) => Ok(layer),
                Err(e) => {
                    warn!(url = %config.url, error = %e, "Live data store unavailable, falling back to degraded mode");
                    Ok(Self::degraded(e.to_string()))
                }
            },
        }
    }

    fn build_live(config: &DataConfig) -> Result<Self, TenancyError> {
        let engine = Arc::new(MemoryDatabase::from_url(&config.url)?);
        info!(instance = %engine.name(), "Live data store ready");
        Ok(Self::live(engine, config.database_pattern.clone()))
    }

    pub fn live(engine: Arc<MemoryDatabase>, database_pattern: impl Into<String>) -> Self {
        Self {
            connector: Arc::new(MemoryConnector::new(Arc::clone(&engine), database_pattern)),
            engine: Some(engine),
            degraded_cause: None,
        }
    }

    pub fn degraded(cause: impl Into<String>) -> Self {
        let cause = cause.into();
        Self {
            connector: Arc::new(DegradedConnector::new(cause.clone())),
            engine: None,
            degraded_cause: Some(cause),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_cause.is_some()
    }

    pub fn degraded_cause(&self) -> Option<&str> {
        self.degraded_cause.as_deref()
    }

    pub fn connector(&self) -> Arc<dyn ConnectionFactory<Handle = dyn RecordStore>> {
        Arc::clone(&self.connector)
    }

    /// The live engine, absent in degraded mode
    pub fn engine(&self) -> Option<&Arc<MemoryDatabase>> {
        self.engine.as_ref()
    }
}

#[async_trait]
impl HealthIndicator for DataLayer {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> HealthCheckResult {
        match (&self.degraded_cause, &self.engine) {
            (Some(cause), _) => HealthCheckResult::degraded(self.name())
                .with_detail("mode", "degraded")
                .with_detail("cause", cause.as_str()),
            (None, Some(engine)) => HealthCheckResult::up(self.name())
                .with_detail("mode", "live")
                .with_detail("instance", engine.name()),
            (None, None) => HealthCheckResult::down(self.name()).with_error("No data store configured"),
        }
    }
}
