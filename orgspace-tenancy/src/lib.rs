//! Multi-tenancy for Orgspace
//!
//! Tenant isolation for a shared service: every request is attributed to one
//! customer organization, and every data access that request makes is
//! confined to that organization's records.
//!
//! # Components
//!
//! - **Registry** ([`TenantRegistry`]) - tenant records, slug/domain uniqueness
//! - **Resolver** ([`TenantResolver`]) - header → route param → subdomain → domain
//! - **Connection cache** ([`ConnectionCache`]) - one live handle per tenant,
//!   deduplicated creation, idle eviction by a single sweep task
//! - **Scoped accessor** ([`TenantDataAccessor`]) - typed repositories that
//!   inject the tenant id into every filter and write
//! - **Degraded fallback** ([`DataLayer`]) - empty reads, refused writes, when
//!   the live store cannot be built
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use orgspace_tenancy::prelude::*;
//!
//! let app = TenancyApp::new(TenancyConfig::default())?;
//! app.start().await;
//!
//! app.registry()
//!     .create(CreateTenantRequest::new("Acme Inc.", "acme"))
//!     .await?;
//!
//! let mut chain = MiddlewareChain::new();
//! chain.use_middleware(app.middleware());
//!
//! let handler = handler_fn(|req: HttpRequest| async move {
//!     let data = tenant_data(&req).expect("tenant middleware ran");
//!     let users = data.users().find_many(Filter::new()).await?;
//!     HttpResponse::json(&users)
//! });
//!
//! let req = HttpRequest::new("GET", "/users").with_header("host", "acme.example.com");
//! let response = chain.apply(req, handler).await?;
//! ```

pub mod admin;
pub mod app;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod degraded;
pub mod error;
pub mod middleware;
pub mod registry;
pub mod resolver;
pub mod scoped;
pub mod store;
pub mod tenant;

pub use admin::TenantAdmin;
pub use app::TenancyApp;
pub use bootstrap::{AdminUser, BootstrapOutcome, BootstrapRequest, TenantProvisioner, TenantUsage};
pub use cache::{CacheStats, ConnectionCache, ConnectionFactory};
pub use config::{CacheSettings, DataConfig, DataMode, Environment, ResolverConfig, TenancyConfig};
pub use degraded::{DataLayer, DegradedConnector, DegradedStore};
pub use error::TenancyError;
pub use middleware::{TenantMiddleware, current_tenant, require_tenant, tenant_context, tenant_data};
pub use registry::{
    CreateTenantRequest, InMemoryTenantStore, TenantPage, TenantRegistry, TenantStore,
    UpdateTenantRequest,
};
pub use resolver::{IdentifierKind, IdentifierStrategy, TenantIdentifier, TenantResolver};
pub use scoped::{
    Category, Entity, Order, Product, Project, ScopedRepository, TenantDataAccessor, User,
};
pub use store::{Filter, MemoryConnector, MemoryDatabase, RawOutcome, RawStatement, RecordStore, Row};
pub use tenant::{
    Tenant, TenantContext, TenantFeatures, TenantLimits, TenantPlan, TenantSettings, TenantStatus,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::admin::TenantAdmin;
    pub use crate::app::TenancyApp;
    pub use crate::config::TenancyConfig;
    pub use crate::error::TenancyError;
    pub use crate::middleware::{TenantMiddleware, require_tenant, tenant_context, tenant_data};
    pub use crate::registry::{CreateTenantRequest, TenantRegistry, UpdateTenantRequest};
    pub use crate::resolver::TenantResolver;
    pub use crate::scoped::{Entity, TenantDataAccessor};
    pub use crate::store::{Filter, RecordStore};
    pub use crate::tenant::{Tenant, TenantContext, TenantPlan, TenantStatus};
    pub use orgspace_core::{HttpRequest, HttpResponse, MiddlewareChain, handler_fn};
}
