//! Tenant Registry
//!
//! Authoritative store of tenant records. [`TenantRegistry`] validates input
//! and assigns defaults; the [`TenantStore`] underneath owns persistence and
//! enforces slug/domain uniqueness atomically.
//!
//! ```rust,ignore
//! let registry = TenantRegistry::in_memory();
//!
//! let tenant = registry
//!     .create(CreateTenantRequest::new("Acme Inc.", "acme").with_plan(TenantPlan::Pro))
//!     .await?;
//!
//! let found = registry.get_by_slug("acme").await?;
//! ```

use crate::TenancyError;
use crate::tenant::{Tenant, TenantPlan, TenantSettings, TenantStatus};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

static SLUG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("slug pattern is valid"));

/// Default page size for [`TenantRegistry::list`]
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Check a slug against `[a-z0-9-]+`.
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_PATTERN.is_match(slug)
}

/// Trimmed, lowercased domain; blank is none
fn normalize_domain(domain: Option<&str>) -> Option<String> {
    domain
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Request to register a new tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub domain: Option<String>,
    /// Defaults to `basic`
    #[serde(default)]
    pub plan: Option<TenantPlan>,
}

impl CreateTenantRequest {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            domain: None,
            plan: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_plan(mut self, plan: TenantPlan) -> Self {
        self.plan = Some(plan);
        self
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTenantRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// `Some(None)` (JSON `null`) clears the domain
    #[serde(default, deserialize_with = "double_option")]
    pub domain: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<TenantStatus>,
    #[serde(default)]
    pub plan: Option<TenantPlan>,
    #[serde(default)]
    pub settings: Option<TenantSettings>,
}

impl UpdateTenantRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_plan(mut self, plan: TenantPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_settings(mut self, settings: TenantSettings) -> Self {
        self.settings = Some(settings);
        self
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// One page of tenants
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantPage {
    pub items: Vec<Tenant>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub page_count: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Tenant persistence
///
/// Implementations must make `insert` and `update` atomic with respect to
/// the slug and domain uniqueness checks.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Insert a new tenant; `Conflict` on a taken slug or domain
    async fn insert(&self, tenant: Tenant) -> Result<Tenant, TenancyError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>, TenancyError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, TenancyError>;

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, TenancyError>;

    /// Replace an existing tenant; `NotFound` if absent, `Conflict` if its
    /// domain now collides with another tenant
    async fn update(&self, tenant: Tenant) -> Result<Tenant, TenancyError>;

    /// Remove a tenant, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool, TenancyError>;

    /// Newest first
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Tenant>, TenancyError>;

    async fn count(&self) -> Result<usize, TenancyError>;
}

#[derive(Default)]
struct StoreInner {
    tenants: HashMap<String, (u64, Tenant)>,
    slugs: HashMap<String, String>,
    domains: HashMap<String, String>,
    next_seq: u64,
}

/// In-process tenant store
#[derive(Default)]
pub struct InMemoryTenantStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn slug_conflict(slug: &str) -> TenancyError {
    TenancyError::Conflict(format!("Organization with slug '{}' already exists", slug))
}

fn domain_conflict(domain: &str) -> TenancyError {
    TenancyError::Conflict(format!(
        "Organization with domain '{}' already exists",
        domain
    ))
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn insert(&self, tenant: Tenant) -> Result<Tenant, TenancyError> {
        let mut inner = self.inner.write();

        if inner.slugs.contains_key(&tenant.slug) {
            return Err(slug_conflict(&tenant.slug));
        }
        if let Some(domain) = &tenant.domain
            && inner.domains.contains_key(domain)
        {
            return Err(domain_conflict(domain));
        }
        if inner.tenants.contains_key(&tenant.id) {
            return Err(TenancyError::Conflict(format!(
                "Organization {} already exists",
                tenant.id
            )));
        }

        inner.slugs.insert(tenant.slug.clone(), tenant.id.clone());
        if let Some(domain) = &tenant.domain {
            inner.domains.insert(domain.clone(), tenant.id.clone());
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.tenants.insert(tenant.id.clone(), (seq, tenant.clone()));

        Ok(tenant)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>, TenancyError> {
        Ok(self.inner.read().tenants.get(id).map(|(_, t)| t.clone()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, TenancyError> {
        let inner = self.inner.read();
        Ok(inner
            .slugs
            .get(slug)
            .and_then(|id| inner.tenants.get(id))
            .map(|(_, t)| t.clone()))
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, TenancyError> {
        let inner = self.inner.read();
        Ok(inner
            .domains
            .get(domain)
            .and_then(|id| inner.tenants.get(id))
            .map(|(_, t)| t.clone()))
    }

    async fn update(&self, tenant: Tenant) -> Result<Tenant, TenancyError> {
        let mut inner = self.inner.write();

        let previous_domain = match inner.tenants.get(&tenant.id) {
            Some((_, existing)) => existing.domain.clone(),
            None => {
                return Err(TenancyError::NotFound(format!(
                    "Organization {} not found",
                    tenant.id
                )));
            }
        };

        if let Some(domain) = &tenant.domain
            && let Some(owner) = inner.domains.get(domain)
            && owner != &tenant.id
        {
            return Err(domain_conflict(domain));
        }

        if let Some(old) = previous_domain {
            inner.domains.remove(&old);
        }
        if let Some(domain) = &tenant.domain {
            inner.domains.insert(domain.clone(), tenant.id.clone());
        }
        if let Some(entry) = inner.tenants.get_mut(&tenant.id) {
            entry.1 = tenant.clone();
        }

        Ok(tenant)
    }

    async fn delete(&self, id: &str) -> Result<bool, TenancyError> {
        let mut inner = self.inner.write();
        let Some((_, tenant)) = inner.tenants.remove(id) else {
            return Ok(false);
        };
        inner.slugs.remove(&tenant.slug);
        if let Some(domain) = &tenant.domain {
            inner.domains.remove(domain);
        }
        Ok(true)
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Tenant>, TenancyError> {
        let inner = self.inner.read();
        let mut entries: Vec<&(u64, Tenant)> = inner.tenants.values().collect();
        entries.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_b.cmp(seq_a))
        });

        Ok(entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, TenancyError> {
        Ok(self.inner.read().tenants.len())
    }
}

/// Tenant registry service
#[derive(Clone)]
pub struct TenantRegistry {
    store: Arc<dyn TenantStore>,
}

impl TenantRegistry {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// Registry over a fresh [`InMemoryTenantStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryTenantStore::new()))
    }

    /// Register a tenant.
    ///
    /// Trims input, validates name and slug, assigns plan defaults and
    /// `status = active`.
    pub async fn create(&self, request: CreateTenantRequest) -> Result<Tenant, TenancyError> {
        let name = request.name.trim();
        let slug = request.slug.trim();

        if name.is_empty() {
            return Err(TenancyError::Validation(
                "Organization name is required".to_string(),
            ));
        }
        if slug.is_empty() {
            return Err(TenancyError::Validation("Slug is required".to_string()));
        }
        if !is_valid_slug(slug) {
            return Err(TenancyError::Validation(
                "Slug must contain only lowercase letters, numbers, and hyphens".to_string(),
            ));
        }

        let domain = normalize_domain(request.domain.as_deref());
        let plan = request.plan.unwrap_or_default();
        let now = Utc::now();

        let tenant = Tenant {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            domain,
            status: TenantStatus::Active,
            plan,
            settings: TenantSettings::for_plan(plan),
            created_at: now,
            updated_at: now,
        };

        let tenant = self.store.insert(tenant).await?;
        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            plan = %tenant.plan,
            "Tenant created"
        );
        Ok(tenant)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Tenant>, TenancyError> {
        self.store.find_by_id(id).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Tenant>, TenancyError> {
        self.store.find_by_slug(slug).await
    }

    pub async fn get_by_domain(&self, domain: &str) -> Result<Option<Tenant>, TenancyError> {
        self.store
            .find_by_domain(&domain.trim().to_ascii_lowercase())
            .await
    }

    /// Like [`get_by_id`](Self::get_by_id) but absent is `NotFound`
    pub async fn require(&self, id: &str) -> Result<Tenant, TenancyError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| TenancyError::NotFound(format!("Organization {} not found", id)))
    }

    /// List tenants newest first. `page` is 1-indexed; both arguments are
    /// clamped to at least 1.
    pub async fn list(&self, page: usize, page_size: usize) -> Result<TenantPage, TenancyError> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        let total = self.store.count().await?;
        let items = self
            .store
            .list((page - 1).saturating_mul(page_size), page_size)
            .await?;
        let page_count = total.div_ceil(page_size);

        Ok(TenantPage {
            items,
            total,
            page,
            page_size,
            page_count,
            has_next: page < page_count,
            has_prev: page > 1,
        })
    }

    /// Apply a partial update and refresh `updated_at`
    pub async fn update(
        &self,
        id: &str,
        request: UpdateTenantRequest,
    ) -> Result<Tenant, TenancyError> {
        let mut tenant = self.require(id).await?;

        if let Some(name) = request.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(TenancyError::Validation(
                    "Organization name is required".to_string(),
                ));
            }
            tenant.name = name.to_string();
        }
        if let Some(domain) = request.domain {
            tenant.domain = normalize_domain(domain.as_deref());
        }
        if let Some(status) = request.status {
            tenant.status = status;
        }
        if let Some(plan) = request.plan {
            tenant.plan = plan;
        }
        if let Some(settings) = request.settings {
            tenant.settings = settings;
        }
        tenant.updated_at = Utc::now();

        let tenant = self.store.update(tenant).await?;
        info!(tenant_id = %tenant.id, status = %tenant.status, "Tenant updated");
        Ok(tenant)
    }

    /// Delete a tenant. Cached handles are not touched.
    pub async fn delete(&self, id: &str) -> Result<(), TenancyError> {
        if !self.store.delete(id).await? {
            return Err(TenancyError::NotFound(format!(
                "Organization {} not found",
                id
            )));
        }
        info!(tenant_id = %id, "Tenant deleted");
        Ok(())
    }
}
