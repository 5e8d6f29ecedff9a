//! Tenant Middleware
//!
//! Resolves the tenant, fetches its data handle from the connection cache
//! and attaches three extensions to the request before calling the rest of
//! the chain:
//!
//! - [`TenantContext`]
//! - [`Tenant`]
//! - [`TenantDataAccessor`]
//!
//! Once a tenant is resolved, every response echoes `x-tenant-id` and
//! `x-tenant-slug`; handler errors are rendered here so they carry the
//! headers too. Resolution failures are rendered as JSON error responses and
//! the chain is not called.

use crate::TenancyError;
use crate::cache::ConnectionCache;
use crate::resolver::TenantResolver;
use crate::scoped::TenantDataAccessor;
use crate::store::RecordStore;
use crate::tenant::{Tenant, TenantContext};
use async_trait::async_trait;
use orgspace_core::middleware::Next;
use orgspace_core::{Error, HttpRequest, HttpResponse, Middleware};
use std::sync::Arc;
use tracing::{debug, error};

pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const TENANT_SLUG_HEADER: &str = "x-tenant-slug";

/// Request-scoped tenant resolution
pub struct TenantMiddleware {
    resolver: TenantResolver,
    cache: ConnectionCache<dyn RecordStore>,
    required: bool,
    expose_internal_errors: bool,
}

impl TenantMiddleware {
    /// Middleware that rejects requests without a tenant identifier
    pub fn new(resolver: TenantResolver, cache: ConnectionCache<dyn RecordStore>) -> Self {
        Self {
            resolver,
            cache,
            required: true,
            expose_internal_errors: false,
        }
    }

    /// Middleware that lets requests without an identifier through untouched.
    ///
    /// An identifier that is present must still resolve.
    pub fn optional(resolver: TenantResolver, cache: ConnectionCache<dyn RecordStore>) -> Self {
        Self::new(resolver, cache).with_required(false)
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Include 5xx detail in error bodies
    pub fn with_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    async fn attach(&self, req: &mut HttpRequest) -> Result<Option<Tenant>, TenancyError> {
        let tenant = if self.required {
            self.resolver.resolve_required(req).await?
        } else {
            match self.resolver.resolve(req).await? {
                Some(tenant) => tenant,
                None => return Ok(None),
            }
        };

        let handle = self.cache.get(&tenant.id).await?;
        let context = tenant.context();

        req.extensions
            .insert(TenantDataAccessor::new(handle, context.clone()));
        req.extensions.insert(context);
        req.extensions.insert(tenant.clone());
        Ok(Some(tenant))
    }

    fn reject(&self, req: &HttpRequest, err: TenancyError) -> HttpResponse {
        let err = Error::from(err);
        if err.is_server_error() {
            error!(path = %req.path, error = %err, "Tenant resolution failed");
        } else {
            debug!(path = %req.path, status = err.status_code(), error = %err, "Tenant rejected");
        }
        err.into_response(self.expose_internal_errors)
    }
}

#[async_trait]
impl Middleware for TenantMiddleware {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        match self.attach(&mut req).await {
            Ok(Some(tenant)) => {
                let path = req.path.clone();
                let response = match next(req).await {
                    Ok(response) => response,
                    Err(err) => {
                        if err.is_server_error() {
                            error!(path = %path, tenant_id = %tenant.id, error = %err, "Handler failed");
                        }
                        err.into_response(self.expose_internal_errors)
                    }
                };
                Ok(response
                    .with_header(TENANT_ID_HEADER, tenant.id)
                    .with_header(TENANT_SLUG_HEADER, tenant.slug))
            }
            Ok(None) => next(req).await,
            Err(e) => Ok(self.reject(&req, e)),
        }
    }
}

/// The resolved tenant context, or a 400 error
pub fn require_tenant(req: &HttpRequest) -> Result<TenantContext, Error> {
    tenant_context(req).ok_or_else(|| Error::BadRequest("Tenant context required".to_string()))
}

pub fn tenant_context(req: &HttpRequest) -> Option<TenantContext> {
    req.extensions.get::<TenantContext>().cloned()
}

pub fn current_tenant(req: &HttpRequest) -> Option<Tenant> {
    req.extensions.get::<Tenant>().cloned()
}

pub fn tenant_data(req: &HttpRequest) -> Option<Arc<TenantDataAccessor>> {
    req.extensions.get_arc::<TenantDataAccessor>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSettings, ResolverConfig};
    use crate::registry::{CreateTenantRequest, TenantRegistry, UpdateTenantRequest};
    use crate::store::{MemoryConnector, MemoryDatabase};
    use crate::tenant::TenantStatus;
    use orgspace_core::{MiddlewareChain, handler_fn};

    struct Fixture {
        registry: TenantRegistry,
        cache: ConnectionCache<dyn RecordStore>,
        engine: Arc<MemoryDatabase>,
        resolver: TenantResolver,
    }

    fn fixture() -> Fixture {
        let registry = TenantRegistry::in_memory();
        let engine = Arc::new(MemoryDatabase::new("test"));
        let cache: ConnectionCache<dyn RecordStore> = ConnectionCache::new(
            Arc::new(MemoryConnector::new(Arc::clone(&engine), "tenant_{slug}")),
            registry.clone(),
            CacheSettings::default(),
        );
        let resolver = TenantResolver::from_config(registry.clone(), &ResolverConfig::default());
        Fixture {
            registry,
            cache,
            engine,
            resolver,
        }
    }

    fn chain(middleware: TenantMiddleware) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(middleware);
        chain
    }

    fn echo_tenant() -> orgspace_core::HandlerFn {
        handler_fn(|req: HttpRequest| async move {
            let slug = tenant_context(&req)
                .map(|c| c.tenant_slug)
                .unwrap_or_else(|| "none".to_string());
            Ok::<_, Error>(HttpResponse::ok().with_body(slug.into_bytes()))
        })
    }

    fn body(response: &HttpResponse) -> serde_json::Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_attaches_tenant_and_echoes_headers() {
        let f = fixture();
        let acme = f
            .registry
            .create(CreateTenantRequest::new("Acme", "acme"))
            .await
            .unwrap();
        let chain = chain(TenantMiddleware::new(f.resolver.clone(), f.cache.clone()));

        let req = HttpRequest::new("GET", "/users").with_header("host", "acme.example.com");
        let response = chain
            .apply(
                req,
                handler_fn(|req: HttpRequest| async move {
                    let ctx = require_tenant(&req).unwrap();
                    let data = tenant_data(&req).unwrap();
                    assert_eq!(data.tenant_id(), ctx.tenant_id);
                    assert_eq!(current_tenant(&req).map(|t| t.slug), Some("acme".to_string()));
                    Ok::<_, Error>(HttpResponse::ok())
                }),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header(TENANT_ID_HEADER), Some(acme.id.as_str()));
        assert_eq!(response.header(TENANT_SLUG_HEADER), Some("acme"));
        assert_eq!(f.cache.stats().tenant_ids, vec![acme.id]);
        assert_eq!(f.engine.databases(), vec!["tenant_acme"]);
    }

    #[tokio::test]
    async fn test_handler_error_keeps_tenant_headers() {
        let f = fixture();
        let acme = f
            .registry
            .create(CreateTenantRequest::new("Acme", "acme"))
            .await
            .unwrap();
        let chain = chain(TenantMiddleware::new(f.resolver.clone(), f.cache.clone()));

        let response = chain
            .apply(
                HttpRequest::new("GET", "/users").with_header("x-tenant-slug", "acme"),
                handler_fn(|_req: HttpRequest| async move {
                    Err::<HttpResponse, _>(Error::Internal("disk full".to_string()))
                }),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(body(&response)["message"], orgspace_core::GENERIC_SERVER_ERROR);
        assert_eq!(response.header(TENANT_ID_HEADER), Some(acme.id.as_str()));
        assert_eq!(response.header(TENANT_SLUG_HEADER), Some("acme"));
    }

    #[tokio::test]
    async fn test_missing_identifier() {
        let f = fixture();
        let chain = chain(TenantMiddleware::new(f.resolver.clone(), f.cache.clone()));

        let response = chain
            .apply(HttpRequest::new("GET", "/").with_header("host", "localhost:3000"), echo_tenant())
            .await
            .unwrap();

        assert_eq!(response.status, 400);
        assert_eq!(
            body(&response)["message"],
            "Please specify a tenant via header, subdomain, domain, or route parameter"
        );
    }

    #[tokio::test]
    async fn test_optional_mode_passes_through() {
        let f = fixture();
        let chain = chain(TenantMiddleware::optional(f.resolver.clone(), f.cache.clone()));

        let response = chain
            .apply(HttpRequest::new("GET", "/"), echo_tenant())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"none");
        assert!(response.header(TENANT_ID_HEADER).is_none());

        let ghost = chain
            .apply(
                HttpRequest::new("GET", "/").with_header("x-tenant-slug", "ghost"),
                echo_tenant(),
            )
            .await
            .unwrap();
        assert_eq!(ghost.status, 404);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_tenants() {
        let f = fixture();
        let dormant = f
            .registry
            .create(CreateTenantRequest::new("Dormant", "dormant"))
            .await
            .unwrap();
        f.registry
            .update(&dormant.id, UpdateTenantRequest::new().with_status(TenantStatus::Inactive))
            .await
            .unwrap();
        let chain = chain(TenantMiddleware::new(f.resolver.clone(), f.cache.clone()));

        let ghost = chain
            .apply(HttpRequest::new("GET", "/").with_header("x-tenant-slug", "ghost"), echo_tenant())
            .await
            .unwrap();
        assert_eq!(ghost.status, 404);
        assert_eq!(body(&ghost)["message"], "Organization with slug 'ghost' not found");

        let inactive = chain
            .apply(HttpRequest::new("GET", "/").with_header("x-tenant-slug", "dormant"), echo_tenant())
            .await
            .unwrap();
        assert_eq!(inactive.status, 403);
        assert_eq!(body(&inactive)["message"], "Organization 'Dormant' is not active");

        assert_eq!(f.cache.stats().count, 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_hides_detail() {
        let f = fixture();
        f.registry
            .create(CreateTenantRequest::new("Acme", "acme"))
            .await
            .unwrap();
        f.engine.set_offline("tenant_acme", true);

        let req = || HttpRequest::new("GET", "/").with_header("x-tenant-slug", "acme");

        let hidden = chain(TenantMiddleware::new(f.resolver.clone(), f.cache.clone()))
            .apply(req(), echo_tenant())
            .await
            .unwrap();
        assert_eq!(hidden.status, 503);
        assert_eq!(body(&hidden)["message"], orgspace_core::GENERIC_SERVER_ERROR);

        let exposed = chain(
            TenantMiddleware::new(f.resolver.clone(), f.cache.clone()).with_internal_errors(true),
        )
        .apply(req(), echo_tenant())
        .await
        .unwrap();
        assert!(body(&exposed)["message"]
            .as_str()
            .is_some_and(|m| m.contains("unreachable")));
    }

    #[test]
    fn test_require_tenant_without_context() {
        let err = require_tenant(&HttpRequest::new("GET", "/")).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.detail(), "Tenant context required");
    }
}
