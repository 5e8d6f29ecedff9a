//! Tenant Resolution
//!
//! Identifies the tenant a request belongs to. Strategies are tried in order
//! and the first one that yields an identifier wins; later strategies are not
//! consulted.
//!
//! Default order:
//!
//! 1. header (`x-tenant-slug`) → slug
//! 2. route parameter (`tenantSlug`) → slug
//! 3. subdomain of a host with at least three labels → slug
//! 4. full host, unless loopback or an IPv4 literal → domain
//!
//! ```rust,ignore
//! let resolver = TenantResolver::from_config(registry, &ResolverConfig::default());
//!
//! let req = HttpRequest::new("GET", "/").with_header("host", "acme.example.com");
//! let tenant = resolver.resolve_required(&req).await?;
//! ```

use crate::TenancyError;
use crate::config::ResolverConfig;
use crate::registry::{TenantRegistry, is_valid_slug};
use crate::tenant::Tenant;
use once_cell::sync::Lazy;
use orgspace_core::HttpRequest;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, trace};

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}$").expect("IPv4 pattern is valid")
});

const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

/// What an identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Slug,
    Domain,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slug => write!(f, "slug"),
            Self::Domain => write!(f, "domain"),
        }
    }
}

/// Identifier extracted from a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantIdentifier {
    pub value: String,
    pub kind: IdentifierKind,
    /// Name of the strategy that produced it
    pub source: &'static str,
}

impl TenantIdentifier {
    pub fn slug(value: impl Into<String>, source: &'static str) -> Self {
        Self {
            value: value.into(),
            kind: IdentifierKind::Slug,
            source,
        }
    }

    pub fn domain(value: impl Into<String>, source: &'static str) -> Self {
        Self {
            value: value.into(),
            kind: IdentifierKind::Domain,
            source,
        }
    }
}

/// One way of pulling an identifier out of a request
pub trait IdentifierStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, req: &HttpRequest) -> Option<TenantIdentifier>;
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Host with any `:port` suffix removed. IPv6 literals yield `None`.
pub fn strip_port(host: &str) -> Option<&str> {
    let host = host.trim();
    if host.starts_with('[') {
        return None;
    }
    let bare = host.split(':').next().unwrap_or(host);
    non_empty(bare)
}

pub fn is_loopback(host: &str) -> bool {
    LOOPBACK_HOSTS.iter().any(|h| h.eq_ignore_ascii_case(host))
}

pub fn is_ipv4(host: &str) -> bool {
    IPV4_PATTERN.is_match(host)
}

/// First label of a host with at least three labels, lowercased.
///
/// ```
/// use orgspace_tenancy::resolver::extract_subdomain;
///
/// assert_eq!(extract_subdomain("acme.example.com:8080"), Some("acme".to_string()));
/// assert_eq!(extract_subdomain("example.com"), None);
/// ```
pub fn extract_subdomain(host: &str) -> Option<String> {
    let host = strip_port(host)?;
    if is_ipv4(host) {
        return None;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 || labels.iter().any(|label| label.is_empty()) {
        return None;
    }
    Some(labels[0].to_ascii_lowercase())
}

/// Slug from a request header
pub struct HeaderStrategy {
    header_name: String,
}

impl HeaderStrategy {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }
}

impl IdentifierStrategy for HeaderStrategy {
    fn name(&self) -> &'static str {
        "header"
    }

    fn extract(&self, req: &HttpRequest) -> Option<TenantIdentifier> {
        let value = non_empty(req.header(&self.header_name)?)?;
        Some(TenantIdentifier::slug(value, self.name()))
    }
}

/// Slug from a named route parameter
pub struct RouteParamStrategy {
    param: String,
}

impl RouteParamStrategy {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl IdentifierStrategy for RouteParamStrategy {
    fn name(&self) -> &'static str {
        "route_param"
    }

    fn extract(&self, req: &HttpRequest) -> Option<TenantIdentifier> {
        let value = non_empty(req.param(&self.param)?)?;
        Some(TenantIdentifier::slug(value, self.name()))
    }
}

/// Slug from the first label of the host
pub struct SubdomainStrategy {
    reserved: Vec<String>,
}

impl SubdomainStrategy {
    pub fn new(reserved: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }
}

impl IdentifierStrategy for SubdomainStrategy {
    fn name(&self) -> &'static str {
        "subdomain"
    }

    fn extract(&self, req: &HttpRequest) -> Option<TenantIdentifier> {
        let subdomain = extract_subdomain(req.host()?)?;
        if self.reserved.iter().any(|r| r == &subdomain) {
            trace!(subdomain = %subdomain, "Reserved subdomain skipped");
            return None;
        }
        Some(TenantIdentifier::slug(subdomain, self.name()))
    }
}

/// Domain from the full host
pub struct DomainStrategy;

impl IdentifierStrategy for DomainStrategy {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn extract(&self, req: &HttpRequest) -> Option<TenantIdentifier> {
        let host = strip_port(req.host()?)?;
        if is_loopback(host) || is_ipv4(host) {
            return None;
        }
        Some(TenantIdentifier::domain(host.to_ascii_lowercase(), self.name()))
    }
}

/// Ordered strategy chain backed by the registry
#[derive(Clone)]
pub struct TenantResolver {
    registry: TenantRegistry,
    strategies: Vec<Arc<dyn IdentifierStrategy>>,
}

impl TenantResolver {
    /// Resolver with no strategies
    pub fn new(registry: TenantRegistry) -> Self {
        Self {
            registry,
            strategies: Vec::new(),
        }
    }

    /// Standard chain, honouring the extraction switches
    pub fn from_config(registry: TenantRegistry, config: &ResolverConfig) -> Self {
        let mut resolver = Self::new(registry)
            .with_strategy(HeaderStrategy::new(&config.header_name))
            .with_strategy(RouteParamStrategy::new(&config.slug_param));
        if config.subdomain_extraction {
            resolver = resolver.with_strategy(SubdomainStrategy::new(&config.reserved_subdomains));
        }
        if config.domain_extraction {
            resolver = resolver.with_strategy(DomainStrategy);
        }
        resolver
    }

    /// Append a strategy to the end of the chain
    pub fn with_strategy<S: IdentifierStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    /// First identifier any strategy yields
    pub fn identify(&self, req: &HttpRequest) -> Option<TenantIdentifier> {
        self.strategies.iter().find_map(|s| s.extract(req))
    }

    /// Look an identifier up and require the tenant to be active
    pub async fn lookup(&self, identifier: &TenantIdentifier) -> Result<Tenant, TenancyError> {
        if identifier.kind == IdentifierKind::Slug && !is_valid_slug(&identifier.value) {
            return Err(TenancyError::Validation(format!(
                "Invalid tenant identifier '{}'",
                identifier.value
            )));
        }

        let found = match identifier.kind {
            IdentifierKind::Slug => self.registry.get_by_slug(&identifier.value).await?,
            IdentifierKind::Domain => self.registry.get_by_domain(&identifier.value).await?,
        };

        let tenant = found.ok_or_else(|| {
            TenancyError::NotFound(format!(
                "Organization with {} '{}' not found",
                identifier.kind, identifier.value
            ))
        })?;

        if !tenant.is_active() {
            return Err(TenancyError::Inactive(format!(
                "Organization '{}' is not active",
                tenant.name
            )));
        }

        debug!(
            tenant_id = %tenant.id,
            tenant_slug = %tenant.slug,
            source = identifier.source,
            "Tenant resolved"
        );
        Ok(tenant)
    }

    /// `Ok(None)` when the request carries no identifier
    pub async fn resolve(&self, req: &HttpRequest) -> Result<Option<Tenant>, TenancyError> {
        match self.identify(req) {
            Some(identifier) => self.lookup(&identifier).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn resolve_required(&self, req: &HttpRequest) -> Result<Tenant, TenancyError> {
        self.resolve(req).await?.ok_or_else(|| {
            TenancyError::NotSpecified(
                "Please specify a tenant via header, subdomain, domain, or route parameter"
                    .to_string(),
            )
        })
    }
}
