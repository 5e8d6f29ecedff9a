//! Health reporting.
//!
//! Components implement [`HealthIndicator`]; [`HealthService`] runs every
//! registered indicator concurrently and folds the results into one
//! [`HealthReport`]. Degraded components keep the service serving (HTTP 200)
//! while reporting `DEGRADED`.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Health status of a component or the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
    /// Serving, but with reduced capability
    Degraded,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Up | HealthStatus::Degraded)
    }

    pub fn http_status_code(&self) -> u16 {
        if self.is_healthy() { 200 } else { 503 }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Up => write!(f, "UP"),
            HealthStatus::Down => write!(f, "DOWN"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Result of checking one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub details: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthCheckResult {
    fn with_status(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            details: BTreeMap::new(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn up(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Up)
    }

    pub fn down(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Down)
    }

    pub fn degraded(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Degraded)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Aggregate health of the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, HealthCheckResult>,
}

impl HealthReport {
    /// Worst component status wins; no components means `UP`.
    pub fn from_results(results: impl IntoIterator<Item = HealthCheckResult>) -> Self {
        let components: BTreeMap<_, _> = results
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        let has = |s: HealthStatus| components.values().any(|c| c.status == s);
        let status = if has(HealthStatus::Down) {
            HealthStatus::Down
        } else if has(HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else if has(HealthStatus::Unknown) {
            HealthStatus::Unknown
        } else {
            HealthStatus::Up
        };

        Self { status, components }
    }
}

/// A component that can report its own health.
#[async_trait]
pub trait HealthIndicator: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> HealthCheckResult;
}

/// Runs registered health indicators.
///
/// ```
/// use async_trait::async_trait;
/// use orgspace_core::{HealthCheckResult, HealthIndicator, HealthService, HealthStatus};
/// use std::sync::Arc;
///
/// struct Store;
///
/// #[async_trait]
/// impl HealthIndicator for Store {
///     fn name(&self) -> &str {
///         "store"
///     }
///
///     async fn check(&self) -> HealthCheckResult {
///         HealthCheckResult::degraded("store").with_detail("mode", "fallback")
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let service = HealthService::new().with_indicator(Arc::new(Store));
/// let report = service.check().await;
/// assert_eq!(report.status, HealthStatus::Degraded);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct HealthService {
    indicators: Vec<Arc<dyn HealthIndicator>>,
}

impl HealthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn HealthIndicator>) -> Self {
        self.indicators.push(indicator);
        self
    }

    pub async fn check(&self) -> HealthReport {
        let checks = self.indicators.iter().map(|indicator| {
            let indicator = Arc::clone(indicator);
            async move {
                let start = Instant::now();
                let mut result = indicator.check().await;
                if result.duration_ms.is_none() {
                    result.duration_ms = Some(start.elapsed().as_millis() as u64);
                }
                result
            }
        });

        HealthReport::from_results(join_all(checks).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, HealthStatus);

    #[async_trait]
    impl HealthIndicator for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn check(&self) -> HealthCheckResult {
            HealthCheckResult::with_status(self.0, self.1)
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(HealthStatus::Up.http_status_code(), 200);
        assert_eq!(HealthStatus::Degraded.http_status_code(), 200);
        assert_eq!(HealthStatus::Down.http_status_code(), 503);
        assert_eq!(HealthStatus::Degraded.to_string(), "DEGRADED");
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_value(HealthStatus::Degraded).unwrap();
        assert_eq!(json, "DEGRADED");
    }

    #[tokio::test]
    async fn test_empty_service_is_up() {
        let report = HealthService::new().check().await;
        assert_eq!(report.status, HealthStatus::Up);
        assert!(report.components.is_empty());
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let service = HealthService::new()
            .with_indicator(Arc::new(Fixed("cache", HealthStatus::Up)))
            .with_indicator(Arc::new(Fixed("database", HealthStatus::Degraded)));

        let report = service.check().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.components.len(), 2);
        assert!(report.components["cache"].duration_ms.is_some());
    }
}
