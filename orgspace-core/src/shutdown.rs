//! Graceful shutdown coordination.
//!
//! Components register async hooks; [`ShutdownManager::initiate_shutdown`]
//! runs them once, in registration order, each under its own timeout.

use crate::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Async cleanup function run during shutdown.
pub type ShutdownHook =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send>> + Send + Sync>;

/// Outcome of running the shutdown hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

pub struct ShutdownManager {
    hooks: RwLock<Vec<(String, ShutdownHook)>>,
    shutdown_initiated: AtomicBool,
    hook_timeout: Duration,
    signal: watch::Sender<bool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            hooks: RwLock::new(Vec::new()),
            shutdown_initiated: AtomicBool::new(false),
            hook_timeout: Duration::from_secs(30),
            signal,
        }
    }

    /// Upper bound on each hook's run time.
    pub fn with_hook_timeout(mut self, duration: Duration) -> Self {
        self.hook_timeout = duration;
        self
    }

    /// Register a named hook.
    pub async fn add_hook(&self, name: impl Into<String>, hook: ShutdownHook) {
        self.hooks.write().await.push((name.into(), hook));
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Receiver that flips to `true` once shutdown starts.
    ///
    /// Background tasks select on this to stop their loops.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    /// Run all hooks. Only the first call does any work.
    pub async fn initiate_shutdown(&self) -> ShutdownReport {
        if self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already initiated");
            return ShutdownReport::default();
        }

        info!("Initiating graceful shutdown");
        self.signal.send_replace(true);

        let mut report = ShutdownReport::default();
        let hooks = self.hooks.read().await;

        for (name, hook) in hooks.iter() {
            match timeout(self.hook_timeout, hook()).await {
                Ok(Ok(())) => {
                    info!(hook = %name, "Shutdown hook completed");
                    report.completed += 1;
                }
                Ok(Err(e)) => {
                    error!(hook = %name, error = %e, "Shutdown hook failed");
                    report.failed += 1;
                }
                Err(_) => {
                    error!(hook = %name, "Shutdown hook timed out");
                    report.timed_out += 1;
                }
            }
        }

        info!("Graceful shutdown complete");
        report
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_hooks_run_once() {
        let manager = ShutdownManager::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        manager
            .add_hook(
                "count",
                Box::new(move || {
                    let counter = counter.clone();
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .await;

        let first = manager.initiate_shutdown().await;
        let second = manager.initiate_shutdown().await;

        assert_eq!(first.completed, 1);
        assert_eq!(second, ShutdownReport::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.is_shutting_down());
    }

    #[tokio::test]
    async fn test_failing_and_slow_hooks_are_reported() {
        let manager = ShutdownManager::new().with_hook_timeout(Duration::from_millis(20));

        manager
            .add_hook(
                "fails",
                Box::new(|| Box::pin(async { Err(Error::Internal("boom".into())) })),
            )
            .await;
        manager
            .add_hook(
                "hangs",
                Box::new(|| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(())
                    })
                }),
            )
            .await;

        let report = manager.initiate_shutdown().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.timed_out, 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_signal() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();
        assert!(!*rx.borrow());

        manager.initiate_shutdown().await;
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
