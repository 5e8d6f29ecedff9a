// Orgspace - multi-tenant backend core
//
// Resolves the tenant behind each request, keeps one data-store handle per
// tenant, and scopes every data access to the resolved tenant.

// Re-export core functionality
pub use orgspace_core::*;

pub use orgspace_config as config;
pub use orgspace_tenancy as tenancy;

pub use orgspace_config::{ConfigError, ConfigManager, Validate};
pub use orgspace_tenancy::{
    ConnectionCache, TenancyApp, TenancyConfig, TenancyError, Tenant, TenantAdmin, TenantContext,
    TenantDataAccessor, TenantMiddleware, TenantRegistry, TenantResolver,
};

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ConfigManager, Error, HealthStatus, HttpRequest, HttpResponse, LogConfig, Middleware,
        MiddlewareChain, handler_fn,
    };
    pub use orgspace_tenancy::prelude::*;
}
