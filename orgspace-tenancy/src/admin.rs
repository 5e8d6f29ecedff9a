//! Operator handlers
//!
//! [`TenantAdmin`] exposes registry, provisioning and cache operations as
//! request handlers. Routing is left to the host application; handlers read
//! the `id` / `slug` route parameters and the `page` / `limit` query values.
//!
//! | handler        | success |
//! |----------------|---------|
//! | `create`       | 201     |
//! | `bootstrap`    | 201     |
//! | `get`          | 200     |
//! | `get_by_slug`  | 200     |
//! | `list`         | 200     |
//! | `update`       | 200     |
//! | `delete`       | 204     |
//! | `stats`        | 200     |
//! | `cache_stats`  | 200     |
//! | `health`       | 200     |

use crate::bootstrap::{BootstrapRequest, TenantProvisioner};
use crate::cache::ConnectionCache;
use crate::registry::{CreateTenantRequest, DEFAULT_PAGE_SIZE, TenantRegistry, UpdateTenantRequest};
use crate::store::RecordStore;
use orgspace_core::{Error, HealthService, HttpRequest, HttpResponse};
use serde::Serialize;
use tracing::{debug, error};

fn param<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str, Error> {
    req.param(name)
        .map(String::as_str)
        .ok_or_else(|| Error::BadRequest(format!("Missing route parameter '{}'", name)))
}

fn query_number(req: &HttpRequest, name: &str, default: usize) -> Result<usize, Error> {
    match req.query(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::BadRequest(format!("Query parameter '{}' must be a positive integer", name))),
    }
}

fn json<T: Serialize>(status: u16, value: &T) -> Result<HttpResponse, Error> {
    HttpResponse::new(status).with_json(value)
}

/// Tenant administration endpoints
#[derive(Clone)]
pub struct TenantAdmin {
    registry: TenantRegistry,
    cache: ConnectionCache<dyn RecordStore>,
    provisioner: TenantProvisioner,
    health: HealthService,
    expose_internal_errors: bool,
}

impl TenantAdmin {
    pub fn new(
        registry: TenantRegistry,
        cache: ConnectionCache<dyn RecordStore>,
        health: HealthService,
    ) -> Self {
        let provisioner = TenantProvisioner::new(registry.clone(), cache.clone());
        Self {
            registry,
            cache,
            provisioner,
            health,
            expose_internal_errors: false,
        }
    }

    pub fn with_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    fn respond(&self, action: &str, result: Result<HttpResponse, Error>) -> HttpResponse {
        match result {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    error!(action, error = %err, "Admin request failed");
                } else {
                    debug!(action, status = err.status_code(), error = %err, "Admin request rejected");
                }
                err.into_response(self.expose_internal_errors)
            }
        }
    }

    /// `POST /tenants`
    pub async fn create(&self, req: HttpRequest) -> HttpResponse {
        let result = async {
            let body: CreateTenantRequest = req.json()?;
            let tenant = self.registry.create(body).await?;
            json(201, &tenant)
        }
        .await;
        self.respond("create", result)
    }

    /// `POST /tenants/bootstrap`
    pub async fn bootstrap(&self, req: HttpRequest) -> HttpResponse {
        let result = async {
            let body: BootstrapRequest = req.json()?;
            let outcome = self.provisioner.bootstrap(body).await?;
            json(201, &outcome)
        }
        .await;
        self.respond("bootstrap", result)
    }

    /// `GET /tenants/:id`
    pub async fn get(&self, req: HttpRequest) -> HttpResponse {
        let result = async {
            let tenant = self.registry.require(param(&req, "id")?).await?;
            json(200, &tenant)
        }
        .await;
        self.respond("get", result)
    }

    /// `GET /tenants/slug/:slug`
    pub async fn get_by_slug(&self, req: HttpRequest) -> HttpResponse {
        let result = async {
            let slug = param(&req, "slug")?;
            let tenant = self.registry.get_by_slug(slug).await?.ok_or_else(|| {
                Error::NotFound(format!("Organization with slug '{}' not found", slug))
            })?;
            json(200, &tenant)
        }
        .await;
        self.respond("get_by_slug", result)
    }

    /// `GET /tenants?page=&limit=`
    pub async fn list(&self, req: HttpRequest) -> HttpResponse {
        let result = async {
            let page = query_number(&req, "page", 1)?;
            let limit = query_number(&req, "limit", DEFAULT_PAGE_SIZE)?;
            let listing = self.registry.list(page, limit).await?;
            json(200, &listing)
        }
        .await;
        self.respond("list", result)
    }

    /// `PATCH /tenants/:id`
    pub async fn update(&self, req: HttpRequest) -> HttpResponse {
        let result = async {
            let id = param(&req, "id")?;
            let body: UpdateTenantRequest = req.json()?;
            let tenant = self.registry.update(id, body).await?;
            json(200, &tenant)
        }
        .await;
        self.respond("update", result)
    }

    /// `DELETE /tenants/:id`; also evicts the tenant's cached handle
    pub async fn delete(&self, req: HttpRequest) -> HttpResponse {
        let result = async {
            let id = param(&req, "id")?;
            self.registry.delete(id).await?;
            self.cache.remove(id).await;
            Ok::<_, Error>(HttpResponse::no_content())
        }
        .await;
        self.respond("delete", result)
    }

    /// `GET /tenants/:id/stats`
    pub async fn stats(&self, req: HttpRequest) -> HttpResponse {
        let result = async {
            let usage = self.provisioner.usage(param(&req, "id")?).await?;
            json(200, &usage)
        }
        .await;
        self.respond("stats", result)
    }

    /// `GET /tenants/cache`
    pub async fn cache_stats(&self, _req: HttpRequest) -> HttpResponse {
        let result = json(200, &self.cache.stats());
        self.respond("cache_stats", result)
    }

    /// `GET /health`; always 200 so liveness probes keep passing in degraded mode
    pub async fn health(&self, _req: HttpRequest) -> HttpResponse {
        let report = self.health.check().await;
        let result = json(200, &report);
        self.respond("health", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use crate::degraded::DataLayer;
    use crate::store::MemoryDatabase;
    use orgspace_core::HealthIndicator;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn admin_with(layer: DataLayer) -> TenantAdmin {
        let registry = TenantRegistry::in_memory();
        let layer = Arc::new(layer);
        let cache = ConnectionCache::new(layer.connector(), registry.clone(), CacheSettings::default());
        let health = HealthService::new()
            .with_indicator(layer as Arc<dyn HealthIndicator>)
            .with_indicator(Arc::new(cache.clone()));
        TenantAdmin::new(registry, cache, health)
    }

    fn admin() -> TenantAdmin {
        admin_with(DataLayer::live(Arc::new(MemoryDatabase::new("test")), "tenant_{slug}"))
    }

    fn post(body: Value) -> HttpRequest {
        HttpRequest::new("POST", "/tenants").with_json(&body).unwrap()
    }

    fn body(response: &HttpResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let admin = admin();
        let created = admin
            .create(post(json!({"name": "Acme", "slug": "acme", "plan": "pro"})))
            .await;
        assert_eq!(created.status, 201);
        let tenant = body(&created);
        assert_eq!(tenant["plan"], "pro");
        assert_eq!(tenant["settings"]["limits"]["users"], 50);

        let id = tenant["id"].as_str().unwrap();
        let fetched = admin
            .get(HttpRequest::new("GET", "/tenants").with_param("id", id))
            .await;
        assert_eq!(fetched.status, 200);

        let by_slug = admin
            .get_by_slug(HttpRequest::new("GET", "/tenants").with_param("slug", "acme"))
            .await;
        assert_eq!(body(&by_slug)["id"], id);
    }

    #[tokio::test]
    async fn test_create_errors() {
        let admin = admin();
        let invalid = admin.create(post(json!({"name": "Acme", "slug": "Acme!"}))).await;
        assert_eq!(invalid.status, 400);
        assert_eq!(
            body(&invalid)["message"],
            "Slug must contain only lowercase letters, numbers, and hyphens"
        );

        admin.create(post(json!({"name": "Acme", "slug": "acme"}))).await;
        let dup = admin.create(post(json!({"name": "Other", "slug": "acme"}))).await;
        assert_eq!(dup.status, 409);

        let malformed = admin
            .create(HttpRequest::new("POST", "/tenants").with_body("{"))
            .await;
        assert_eq!(malformed.status, 400);

        let missing = admin.get(HttpRequest::new("GET", "/tenants")).await;
        assert_eq!(missing.status, 400);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let admin = admin();
        for slug in ["a", "b", "c"] {
            admin.create(post(json!({"name": slug, "slug": slug}))).await;
        }

        let page = admin
            .list(
                HttpRequest::new("GET", "/tenants")
                    .with_query("page", "2")
                    .with_query("limit", "2"),
            )
            .await;
        let listing = body(&page);
        assert_eq!(listing["total"], 3);
        assert_eq!(listing["items"].as_array().map(Vec::len), Some(1));
        assert_eq!(listing["hasPrev"], true);
        assert_eq!(listing["hasNext"], false);

        let bad = admin
            .list(HttpRequest::new("GET", "/tenants").with_query("page", "two"))
            .await;
        assert_eq!(bad.status, 400);
    }

    #[tokio::test]
    async fn test_update_and_delete_evicts_cache() {
        let admin = admin();
        let outcome = admin
            .bootstrap(post(json!({
                "name": "Acme",
                "slug": "acme",
                "admin": {"email": "owner@acme.test"}
            })))
            .await;
        assert_eq!(outcome.status, 201);
        let id = body(&outcome)["tenant"]["id"].as_str().unwrap().to_string();
        assert_eq!(admin.cache.stats().count, 1);

        let updated = admin
            .update(
                HttpRequest::new("PATCH", "/tenants")
                    .with_param("id", &id)
                    .with_json(&json!({"status": "inactive", "domain": "acme.io"}))
                    .unwrap(),
            )
            .await;
        assert_eq!(body(&updated)["status"], "inactive");
        assert_eq!(body(&updated)["domain"], "acme.io");

        let stats = admin
            .stats(HttpRequest::new("GET", "/").with_param("id", &id))
            .await;
        assert_eq!(body(&stats)["users"], 1);

        let deleted = admin
            .delete(HttpRequest::new("DELETE", "/").with_param("id", &id))
            .await;
        assert_eq!(deleted.status, 204);
        assert_eq!(admin.cache.stats().count, 0);

        let again = admin
            .delete(HttpRequest::new("DELETE", "/").with_param("id", &id))
            .await;
        assert_eq!(again.status, 404);

        let cache = admin.cache_stats(HttpRequest::new("GET", "/")).await;
        assert_eq!(body(&cache)["tenantIds"], json!([]));
    }

    #[tokio::test]
    async fn test_health_is_always_ok() {
        let live = admin().health(HttpRequest::new("GET", "/health")).await;
        assert_eq!(live.status, 200);
        assert_eq!(body(&live)["status"], "UP");

        let degraded = admin_with(DataLayer::degraded("unreachable"))
            .health(HttpRequest::new("GET", "/health"))
            .await;
        assert_eq!(degraded.status, 200);
        assert_eq!(body(&degraded)["status"], "DEGRADED");
        assert_eq!(body(&degraded)["components"]["database"]["details"]["mode"], "degraded");
    }
}
