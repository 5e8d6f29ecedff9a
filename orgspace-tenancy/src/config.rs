//! Tenancy configuration
//!
//! Loaded from the `ConfigManager` tree; every field has a default so an
//! empty tree yields a working setup.
//!
//! ```toml
//! environment = "development"
//!
//! [resolver]
//! header_name = "x-tenant-slug"
//! reserved_subdomains = ["www", "api"]
//!
//! [cache]
//! idle_ttl_secs = 300
//!
//! [data]
//! mode = "auto"
//! url = "memory://default"
//! ```

use crate::tenant::Tenant;
use orgspace_config::{ConfigError, ConfigManager, ConfigValidator, Validate};
use orgspace_core::LogConfig;
use serde::Deserialize;
use std::time::Duration;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// Tenant identification settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Header carrying the tenant slug
    pub header_name: String,
    /// Route parameter carrying the tenant slug
    pub slug_param: String,
    pub subdomain_extraction: bool,
    pub domain_extraction: bool,
    /// Reject requests without an identifier
    pub required: bool,
    /// Subdomains never treated as tenant slugs
    pub reserved_subdomains: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            header_name: "x-tenant-slug".to_string(),
            slug_param: "tenantSlug".to_string(),
            subdomain_extraction: true,
            domain_extraction: true,
            required: true,
            reserved_subdomains: vec!["www".to_string(), "api".to_string()],
        }
    }
}

/// Connection cache timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub probe_timeout_ms: u64,
    pub drain_timeout_ms: u64,
}

impl CacheSettings {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 300,
            sweep_interval_secs: 30,
            probe_timeout_ms: 5_000,
            drain_timeout_ms: 10_000,
        }
    }
}

/// Data layer selection at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    /// Fail startup when the live backend cannot be built
    Live,
    /// Always use the degraded stand-in
    Degraded,
    /// Live, falling back to degraded with a warning
    #[default]
    Auto,
}

/// Backing store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub mode: DataMode,
    pub url: String,
    /// Per-tenant database name; `{id}` and `{slug}` are substituted
    pub database_pattern: String,
}

impl DataConfig {
    /// Database name for a tenant
    pub fn database_name(&self, tenant: &Tenant) -> String {
        database_name(&self.database_pattern, tenant)
    }
}

pub(crate) fn database_name(pattern: &str, tenant: &Tenant) -> String {
    pattern
        .replace("{id}", &tenant.id)
        .replace("{slug}", &tenant.slug)
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            mode: DataMode::default(),
            url: "memory://default".to_string(),
            database_pattern: "tenant_{slug}".to_string(),
        }
    }
}

/// Root tenancy configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TenancyConfig {
    pub environment: Environment,
    /// Show internal error detail in responses. Implied by `development`.
    pub expose_internal_errors: bool,
    pub resolver: ResolverConfig,
    pub cache: CacheSettings,
    pub data: DataConfig,
    pub log: LogConfig,
}

impl TenancyConfig {
    /// Extract and validate from a loaded manager
    pub fn load(manager: &ConfigManager) -> Result<Self, ConfigError> {
        manager.load_validated()
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Whether 5xx responses carry their real message
    pub fn diagnostic_errors(&self) -> bool {
        self.expose_internal_errors || self.is_development()
    }
}

impl Validate for TenancyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ConfigValidator::not_empty(&self.resolver.header_name, "resolver.header_name")?;
        ConfigValidator::not_empty(&self.resolver.slug_param, "resolver.slug_param")?;
        for subdomain in &self.resolver.reserved_subdomains {
            ConfigValidator::lowercase(subdomain, "resolver.reserved_subdomains")?;
        }

        ConfigValidator::positive(self.cache.idle_ttl_secs, "cache.idle_ttl_secs")?;
        ConfigValidator::positive(self.cache.sweep_interval_secs, "cache.sweep_interval_secs")?;
        ConfigValidator::positive(self.cache.probe_timeout_ms, "cache.probe_timeout_ms")?;

        ConfigValidator::not_empty(&self.data.url, "data.url")?;
        ConfigValidator::not_empty(&self.data.database_pattern, "data.database_pattern")?;
        Ok(())
    }
}
