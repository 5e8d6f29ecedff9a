//! Tenant provisioning
//!
//! `bootstrap` registers a tenant and seeds its data: an admin user and,
//! when the tenant's settings enable ecommerce, a default set of categories.

use crate::TenancyError;
use crate::cache::ConnectionCache;
use crate::registry::{CreateTenantRequest, TenantRegistry};
use crate::scoped::{Category, TenantDataAccessor, User};
use crate::store::{Filter, RecordStore};
use crate::tenant::Tenant;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Categories seeded for ecommerce tenants: (name, slug)
pub const DEFAULT_CATEGORIES: [(&str, &str); 4] = [
    ("Electronics", "electronics"),
    ("Clothing", "clothing"),
    ("Books", "books"),
    ("Home & Garden", "home-garden"),
];

const DEFAULT_ADMIN_NAME: &str = "Admin";

/// Initial administrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl AdminUser {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Body of a bootstrap request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRequest {
    #[serde(flatten)]
    pub tenant: CreateTenantRequest,
    pub admin: AdminUser,
}

/// What bootstrap created
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapOutcome {
    pub tenant: Tenant,
    pub admin: User,
    pub categories: Vec<Category>,
}

/// Per-tenant record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TenantUsage {
    pub users: usize,
    pub projects: usize,
    pub products: usize,
    pub orders: usize,
}

/// Seeds and inspects tenant data
#[derive(Clone)]
pub struct TenantProvisioner {
    registry: TenantRegistry,
    cache: ConnectionCache<dyn RecordStore>,
}

impl TenantProvisioner {
    pub fn new(registry: TenantRegistry, cache: ConnectionCache<dyn RecordStore>) -> Self {
        Self { registry, cache }
    }

    async fn accessor(&self, tenant: &Tenant) -> Result<TenantDataAccessor, TenancyError> {
        let handle = self.cache.get(&tenant.id).await?;
        Ok(TenantDataAccessor::new(handle, tenant.context()))
    }

    /// Create a tenant with its admin user and default data.
    ///
    /// The tenant stays registered if seeding the admin user fails.
    pub async fn bootstrap(&self, request: BootstrapRequest) -> Result<BootstrapOutcome, TenancyError> {
        let email = request.admin.email.trim();
        if email.is_empty() {
            return Err(TenancyError::Validation("Admin email is required".to_string()));
        }

        let tenant = self.registry.create(request.tenant).await?;
        let data = self.accessor(&tenant).await?;

        let admin = data
            .users()
            .create(User {
                email: email.to_string(),
                name: request
                    .admin
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string()),
                role: "admin".to_string(),
                status: "active".to_string(),
                ..Default::default()
            })
            .await?;

        let mut categories = Vec::new();
        if tenant.settings.features.ecommerce {
            let repo = data.categories();
            for (name, slug) in DEFAULT_CATEGORIES {
                let category = Category {
                    name: name.to_string(),
                    slug: slug.to_string(),
                    status: "active".to_string(),
                    ..Default::default()
                };
                match repo.create(category).await {
                    Ok(created) => categories.push(created),
                    Err(e) => {
                        warn!(tenant_id = %tenant.id, category = slug, error = %e, "Skipping default category");
                    }
                }
            }
        }

        info!(
            tenant_id = %tenant.id,
            tenant_slug = %tenant.slug,
            categories = categories.len(),
            "Tenant bootstrapped"
        );

        Ok(BootstrapOutcome {
            tenant,
            admin,
            categories,
        })
    }

    /// Record counts for one tenant
    pub async fn usage(&self, tenant_id: &str) -> Result<TenantUsage, TenancyError> {
        let tenant = self.registry.require(tenant_id).await?;
        let data = self.accessor(&tenant).await?;

        Ok(TenantUsage {
            users: data.users().count(Filter::new()).await?,
            projects: data.projects().count(Filter::new()).await?,
            products: data.products().count(Filter::new()).await?,
            orders: data.orders().count(Filter::new()).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ConnectionFactory;
    use crate::config::CacheSettings;
    use crate::degraded::DegradedConnector;
    use crate::scoped::{Order, Project};
    use crate::store::{MemoryConnector, MemoryDatabase};
    use crate::tenant::TenantPlan;
    use std::sync::Arc;

    fn provisioner_with(factory: Arc<dyn ConnectionFactory<Handle = dyn RecordStore>>) -> TenantProvisioner {
        let registry = TenantRegistry::in_memory();
        let cache = ConnectionCache::new(factory, registry.clone(), CacheSettings::default());
        TenantProvisioner::new(registry, cache)
    }

    fn provisioner() -> TenantProvisioner {
        let engine = Arc::new(MemoryDatabase::new("test"));
        provisioner_with(Arc::new(MemoryConnector::new(engine, "tenant_{slug}")))
    }

    fn request(slug: &str, plan: TenantPlan) -> BootstrapRequest {
        BootstrapRequest {
            tenant: CreateTenantRequest::new("Acme Inc.", slug).with_plan(plan),
            admin: AdminUser::new("owner@acme.test"),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_basic_plan() {
        let p = provisioner();
        let outcome = p.bootstrap(request("acme", TenantPlan::Basic)).await.unwrap();

        assert_eq!(outcome.admin.role, "admin");
        assert_eq!(outcome.admin.status, "active");
        assert_eq!(outcome.admin.name, "Admin");
        assert_eq!(outcome.admin.org_id, outcome.tenant.id);
        assert!(outcome.categories.is_empty());

        let usage = p.usage(&outcome.tenant.id).await.unwrap();
        assert_eq!(usage, TenantUsage { users: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn test_bootstrap_ecommerce_seeds_categories() {
        let p = provisioner();
        let mut req = request("shop", TenantPlan::Pro);
        req.admin = AdminUser::new("owner@shop.test").with_name("Owner");
        let outcome = p.bootstrap(req).await.unwrap();

        assert_eq!(outcome.admin.name, "Owner");
        let slugs: Vec<&str> = outcome.categories.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["electronics", "clothing", "books", "home-garden"]);
        assert!(outcome.categories.iter().all(|c| c.org_id == outcome.tenant.id));
    }

    #[tokio::test]
    async fn test_bootstrap_requires_admin_email() {
        let p = provisioner();
        let mut req = request("acme", TenantPlan::Basic);
        req.admin.email = "   ".to_string();

        assert!(matches!(p.bootstrap(req).await, Err(TenancyError::Validation(_))));
        assert!(p.registry.get_by_slug("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_conflict() {
        let p = provisioner();
        p.bootstrap(request("acme", TenantPlan::Basic)).await.unwrap();
        let err = p.bootstrap(request("acme", TenantPlan::Basic)).await.unwrap_err();
        assert!(matches!(err, TenancyError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_in_degraded_mode() {
        let p = provisioner_with(Arc::new(DegradedConnector::new("offline")));
        let err = p.bootstrap(request("acme", TenantPlan::Basic)).await.unwrap_err();

        assert!(matches!(err, TenancyError::Degraded(_)));
        assert!(p.registry.get_by_slug("acme").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_usage_counts_only_own_records() {
        let p = provisioner();
        let a = p.bootstrap(request("alpha", TenantPlan::Basic)).await.unwrap().tenant;
        let b = p.bootstrap(request("beta", TenantPlan::Basic)).await.unwrap().tenant;

        let data = p.accessor(&a).await.unwrap();
        data.projects()
            .create(Project {
                name: "Site".into(),
                status: "active".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        data.orders()
            .create(Order {
                total: 12.5,
                status: "paid".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let usage = p.usage(&a.id).await.unwrap();
        assert_eq!((usage.users, usage.projects, usage.orders), (1, 1, 1));
        assert_eq!(p.usage(&b.id).await.unwrap().projects, 0);
        assert!(matches!(p.usage("ghost").await, Err(TenancyError::NotFound(_))));
    }
}
