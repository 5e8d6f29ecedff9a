//! Per-tenant connection cache
//!
//! Maps a tenant id to a live data-store handle. Handles are created lazily
//! through a [`ConnectionFactory`], verified with a bounded probe, and evicted
//! after a fixed idle TTL by a single background sweep task.
//!
//! Concurrent `get` calls for the same tenant share one creation. Creation
//! runs in its own task, so a caller that gives up (request timeout, client
//! disconnect) does not cancel it for the others. Failed creations are never
//! cached; the next `get` tries again.
//!
//! Retired handles (evicted, removed or drained) are taken out of the index
//! first, then disposed once every outstanding clone has been dropped or the
//! drain timeout elapses.

use crate::TenancyError;
use crate::config::CacheSettings;
use crate::registry::TenantRegistry;
use crate::tenant::Tenant;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use orgspace_core::{HealthCheckResult, HealthIndicator};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tracing::{debug, error, info, trace, warn};

/// Poll interval while waiting for a retired handle's users to finish
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds, verifies and releases data-store handles
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Handle: ?Sized + Send + Sync + 'static;

    /// Open a handle for a tenant
    async fn connect(&self, tenant: &Tenant) -> Result<Arc<Self::Handle>, TenancyError>;

    /// Connectivity check run once after `connect`
    async fn probe(&self, handle: &Self::Handle) -> Result<(), TenancyError>;

    /// Release a handle. Best-effort.
    async fn dispose(&self, handle: &Self::Handle);
}

type Creation<H> = Shared<BoxFuture<'static, Result<Arc<H>, TenancyError>>>;

struct CacheEntry<H: ?Sized> {
    handle: Arc<H>,
    last_accessed: Instant,
}

struct CacheState<H: ?Sized> {
    entries: HashMap<String, CacheEntry<H>>,
    inflight: HashMap<String, (u64, Creation<H>)>,
    /// No new creations
    closing: bool,
    /// Entries already collected by `drain_all`
    drained: bool,
}

struct Sweeper {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct CacheInner<H: ?Sized + Send + Sync + 'static> {
    factory: Arc<dyn ConnectionFactory<Handle = H>>,
    registry: TenantRegistry,
    settings: CacheSettings,
    state: Mutex<CacheState<H>>,
    sweeper: Mutex<Option<Sweeper>>,
    generation: AtomicU64,
}

/// Diagnostic snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub count: usize,
    pub tenant_ids: Vec<String>,
    pub inflight: usize,
}

/// Per-tenant handle cache
///
/// Cheap to clone; clones share the same index.
pub struct ConnectionCache<H: ?Sized + Send + Sync + 'static> {
    inner: Arc<CacheInner<H>>,
}

impl<H: ?Sized + Send + Sync + 'static> Clone for ConnectionCache<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: ?Sized + Send + Sync + 'static> ConnectionCache<H> {
    pub fn new(
        factory: Arc<dyn ConnectionFactory<Handle = H>>,
        registry: TenantRegistry,
        settings: CacheSettings,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                factory,
                registry,
                settings,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    inflight: HashMap::new(),
                    closing: false,
                    drained: false,
                }),
                sweeper: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Fetch the tenant's handle, creating it on a miss.
    ///
    /// A hit refreshes the entry's last-access time. A miss joins any
    /// creation already in flight for the tenant, or starts one.
    pub async fn get(&self, tenant_id: &str) -> Result<Arc<H>, TenancyError> {
        let creation = {
            let mut state = self.inner.state.lock();
            if state.closing {
                return Err(TenancyError::CacheClosed);
            }

            if let Some(entry) = state.entries.get_mut(tenant_id) {
                entry.last_accessed = Instant::now();
                trace!(tenant_id = %tenant_id, "Connection cache hit");
                return Ok(Arc::clone(&entry.handle));
            }

            match state.inflight.get(tenant_id) {
                Some((_, creation)) => {
                    debug!(tenant_id = %tenant_id, "Joining in-flight handle creation");
                    creation.clone()
                }
                None => {
                    debug!(tenant_id = %tenant_id, "Connection cache miss, creating handle");
                    let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
                    let creation = self.spawn_creation(tenant_id.to_string(), generation);
                    state
                        .inflight
                        .insert(tenant_id.to_string(), (generation, creation.clone()));
                    creation
                }
            }
        };

        creation.await
    }

    fn spawn_creation(&self, tenant_id: String, generation: u64) -> Creation<H> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.create(tenant_id, generation).await });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(TenancyError::Internal(format!(
                    "Handle creation task failed: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// Evict and dispose a tenant's handle. Returns whether one was cached.
    pub async fn remove(&self, tenant_id: &str) -> bool {
        let entry = self.inner.state.lock().entries.remove(tenant_id);
        match entry {
            Some(entry) => {
                info!(tenant_id = %tenant_id, "Evicting cached handle");
                self.inner.retire(tenant_id, entry.handle).await;
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let mut tenant_ids: Vec<String> = state.entries.keys().cloned().collect();
        tenant_ids.sort();
        CacheStats {
            count: tenant_ids.len(),
            tenant_ids,
            inflight: state.inflight.len(),
        }
    }

    pub fn contains(&self, tenant_id: &str) -> bool {
        self.inner.state.lock().entries.contains_key(tenant_id)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closing
    }

    /// Evict every entry idle for at least the configured TTL.
    pub async fn evict_expired(&self) -> usize {
        self.inner.evict_expired().await
    }

    /// Spawn the background sweep task. Returns false if already running or
    /// the sweep interval is zero.
    pub fn start_sweeper(&self) -> bool {
        let interval = self.inner.settings.sweep_interval();
        if interval.is_zero() {
            error!("Sweep interval is zero, idle eviction disabled");
            return false;
        }

        let mut slot = self.inner.sweeper.lock();
        if slot.is_some() {
            return false;
        }

        let (stop, mut stopped) = watch::channel(false);
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let evicted = inner.evict_expired().await;
                        if evicted > 0 {
                            debug!(evicted, "Idle sweep complete");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            trace!("Connection cache sweeper stopped");
        });

        *slot = Some(Sweeper { stop, task });
        info!(interval_secs = interval.as_secs(), "Connection cache sweeper started");
        true
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn stop_sweeper(&self) {
        let sweeper = self.inner.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.stop.send(true);
            if let Err(e) = sweeper.task.await {
                warn!(error = %e, "Connection cache sweeper ended abnormally");
            }
        }
    }

    /// Close the cache and dispose every handle.
    ///
    /// Stops the sweeper, refuses new creations, waits (bounded by the drain
    /// timeout) for creations already in flight, then retires every entry.
    /// Returns the number of handles disposed.
    pub async fn drain_all(&self) -> usize {
        let pending: Vec<Creation<H>> = {
            let mut state = self.inner.state.lock();
            state.closing = true;
            state.inflight.values().map(|(_, c)| c.clone()).collect()
        };

        self.stop_sweeper().await;

        let drain_timeout = self.inner.settings.drain_timeout();
        if !pending.is_empty() {
            info!(count = pending.len(), "Waiting for in-flight handle creations");
            if timeout(drain_timeout, join_all(pending)).await.is_err() {
                warn!("Timed out waiting for in-flight handle creations");
            }
        }

        let entries: Vec<(String, CacheEntry<H>)> = {
            let mut state = self.inner.state.lock();
            state.drained = true;
            state.entries.drain().collect()
        };

        let count = entries.len();
        join_all(
            entries
                .into_iter()
                .map(|(tenant_id, entry)| {
                    let inner = Arc::clone(&self.inner);
                    async move { inner.retire(&tenant_id, entry.handle).await }
                }),
        )
        .await;

        info!(disposed = count, "Connection cache drained");
        count
    }
}

impl<H: ?Sized + Send + Sync + 'static> CacheInner<H> {
    async fn create(
        self: Arc<Self>,
        tenant_id: String,
        generation: u64,
    ) -> Result<Arc<H>, TenancyError> {
        let _inflight = InflightGuard {
            inner: &*self,
            tenant_id: &tenant_id,
            generation,
        };

        let handle = match self.build(&tenant_id).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(tenant_id = %tenant_id, error = %e, "Handle creation failed");
                return Err(e);
            }
        };

        // the tenant may have been deleted while the handle was being built
        match self.registry.get_by_id(&tenant_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(tenant_id = %tenant_id, "Tenant deleted during handle creation, disposing");
                self.factory.dispose(&handle).await;
                return Err(TenancyError::NotFound(format!(
                    "Organization {} not found",
                    tenant_id
                )));
            }
            Err(e) => {
                self.factory.dispose(&handle).await;
                return Err(e);
            }
        }

        let late = {
            let mut state = self.state.lock();
            if state.drained {
                true
            } else {
                state.entries.insert(
                    tenant_id.clone(),
                    CacheEntry {
                        handle: Arc::clone(&handle),
                        last_accessed: Instant::now(),
                    },
                );
                false
            }
        };

        if late {
            warn!(tenant_id = %tenant_id, "Handle created after drain, disposing");
            self.factory.dispose(&handle).await;
            return Err(TenancyError::CacheClosed);
        }

        debug!(tenant_id = %tenant_id, "Handle cached");
        Ok(handle)
    }

    async fn build(&self, tenant_id: &str) -> Result<Arc<H>, TenancyError> {
        let tenant = self
            .registry
            .get_by_id(tenant_id)
            .await?
            .ok_or_else(|| TenancyError::NotFound(format!("Organization {} not found", tenant_id)))?;

        let handle = self.factory.connect(&tenant).await?;

        let probe_timeout = self.settings.probe_timeout();
        let failure = match timeout(probe_timeout, self.factory.probe(&handle)).await {
            Ok(Ok(())) => return Ok(handle),
            Ok(Err(e)) => TenancyError::Connectivity(format!("Probe failed: {}", e)),
            Err(_) => TenancyError::Connectivity(format!(
                "Probe timed out after {}ms",
                probe_timeout.as_millis()
            )),
        };

        self.factory.dispose(&handle).await;
        Err(failure)
    }

    async fn evict_expired(&self) -> usize {
        let ttl = self.settings.idle_ttl();
        let now = Instant::now();

        let expired: Vec<(String, Arc<H>)> = {
            let mut state = self.state.lock();
            let keys: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_accessed) >= ttl)
                .map(|(key, _)| key.clone())
                .collect();

            keys.into_iter()
                .filter_map(|key| state.entries.remove(&key).map(|e| (key, e.handle)))
                .collect()
        };

        let count = expired.len();
        for (tenant_id, _) in &expired {
            info!(tenant_id = %tenant_id, idle_ttl_secs = ttl.as_secs(), "Evicting idle handle");
        }
        join_all(
            expired
                .into_iter()
                .map(|(tenant_id, handle)| async move { self.retire(&tenant_id, handle).await }),
        )
        .await;

        count
    }

    /// Dispose a handle already removed from the index once its last outside
    /// user lets go, or when the drain timeout elapses.
    async fn retire(&self, tenant_id: &str, handle: Arc<H>) {
        let drain_timeout = self.settings.drain_timeout();
        let start = Instant::now();

        while Arc::strong_count(&handle) > 1 {
            if start.elapsed() >= drain_timeout {
                warn!(
                    tenant_id = %tenant_id,
                    users = Arc::strong_count(&handle) - 1,
                    "Drain timeout reached, disposing handle still in use"
                );
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.factory.dispose(&handle).await;
        debug!(tenant_id = %tenant_id, "Handle disposed");
    }
}

#[async_trait]
impl<H: ?Sized + Send + Sync + 'static> HealthIndicator for ConnectionCache<H> {
    fn name(&self) -> &str {
        "connection_cache"
    }

    async fn check(&self) -> HealthCheckResult {
        let stats = self.stats();
        let result = if self.is_closed() {
            HealthCheckResult::degraded(self.name()).with_detail("state", "draining")
        } else {
            HealthCheckResult::up(self.name())
        };
        result
            .with_detail("handles", stats.count.to_string())
            .with_detail("inflight", stats.inflight.to_string())
    }
}

/// Clears this creation's in-flight record however the creation ends.
struct InflightGuard<'a, H: ?Sized + Send + Sync + 'static> {
    inner: &'a CacheInner<H>,
    tenant_id: &'a str,
    generation: u64,
}

impl<H: ?Sized + Send + Sync + 'static> Drop for InflightGuard<'_, H> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if matches!(state.inflight.get(self.tenant_id), Some((g, _)) if *g == self.generation) {
            state.inflight.remove(self.tenant_id);
        }
    }
}
