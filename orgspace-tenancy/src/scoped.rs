//! Tenant-scoped data access
//!
//! [`TenantDataAccessor`] wraps a raw [`RecordStore`] handle together with
//! the owning tenant's identity. Every repository operation it hands out
//! carries that identity: filters are constrained by `org_id` and written
//! records have `org_id` set, overriding whatever the caller supplied.
//!
//! ```rust,ignore
//! let data = tenant_data(&req).ok_or(...)?;
//!
//! let admins = data
//!     .users()
//!     .find_many(Filter::new().eq("role", "admin"))
//!     .await?;
//! ```

use crate::TenancyError;
use crate::store::{Filter, ID_COLUMN, RawOutcome, RawStatement, RecordStore, Row};
use crate::tenant::TenantContext;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Column holding the owning tenant's id
pub const TENANT_COLUMN: &str = "org_id";

/// A record type living in one table
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
}

/// Organization member
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub org_id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for User {
    const TABLE: &'static str = "users";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub org_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Project {
    const TABLE: &'static str = "projects";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub org_id: String,
    pub name: String,
    pub slug: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Category {
    const TABLE: &'static str = "categories";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub org_id: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub category_id: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Product {
    const TABLE: &'static str = "products";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub total: f64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Order {
    const TABLE: &'static str = "orders";
}

fn to_row<T: Serialize>(value: &T) -> Result<Row, TenancyError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(TenancyError::Validation(
            "Record must serialize to an object".to_string(),
        )),
        Err(e) => Err(TenancyError::Internal(format!("Failed to encode record: {}", e))),
    }
}

fn from_row<E: Entity>(row: Row) -> Result<E, TenancyError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| {
        TenancyError::Storage(format!("Malformed row in '{}': {}", E::TABLE, e))
    })
}

/// Typed repository for one entity, pinned to one tenant
pub struct ScopedRepository<E> {
    store: Arc<dyn RecordStore>,
    tenant_id: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ScopedRepository<E> {
    fn new(store: Arc<dyn RecordStore>, tenant_id: String) -> Self {
        Self {
            store,
            tenant_id,
            _entity: PhantomData,
        }
    }

    fn scope(&self, mut filter: Filter) -> Filter {
        filter.set(TENANT_COLUMN, self.tenant_id.clone());
        filter
    }

    fn by_id(&self, id: &str) -> Filter {
        self.scope(Filter::new().eq(ID_COLUMN, id))
    }

    pub async fn find_many(&self, filter: Filter) -> Result<Vec<E>, TenancyError> {
        self.store
            .select(E::TABLE, &self.scope(filter), None)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }

    pub async fn find_first(&self, filter: Filter) -> Result<Option<E>, TenancyError> {
        let mut rows = self.store.select(E::TABLE, &self.scope(filter), Some(1)).await?;
        rows.pop().map(from_row).transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<E>, TenancyError> {
        self.find_first(Filter::new().eq(ID_COLUMN, id)).await
    }

    /// Insert a record owned by this tenant. The store always assigns the
    /// `id`; any id on `entity` is ignored.
    pub async fn create(&self, entity: E) -> Result<E, TenancyError> {
        let mut row = to_row(&entity)?;
        row.remove(ID_COLUMN);
        row.insert(
            TENANT_COLUMN.to_string(),
            Value::String(self.tenant_id.clone()),
        );
        from_row(self.store.insert(E::TABLE, row).await?)
    }

    /// Apply a partial update. `id` and `org_id` in the patch are ignored.
    pub async fn update(&self, id: &str, patch: Value) -> Result<E, TenancyError> {
        let Value::Object(mut patch) = patch else {
            return Err(TenancyError::Validation(
                "Update patch must be an object".to_string(),
            ));
        };
        patch.remove(ID_COLUMN);
        patch.remove(TENANT_COLUMN);

        let mut current = self
            .store
            .select(E::TABLE, &self.by_id(id), Some(1))
            .await?
            .pop()
            .ok_or_else(|| self.not_found(id))?;
        current.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Err(e) = serde_json::from_value::<E>(Value::Object(current)) {
            return Err(TenancyError::Validation(format!(
                "Invalid update for '{}': {}",
                E::TABLE,
                e
            )));
        }

        let mut rows = self.store.update(E::TABLE, &self.by_id(id), patch).await?;
        match rows.pop() {
            Some(row) => from_row(row),
            None => Err(self.not_found(id)),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), TenancyError> {
        match self.store.delete(E::TABLE, &self.by_id(id)).await? {
            0 => Err(self.not_found(id)),
            _ => Ok(()),
        }
    }

    pub async fn count(&self, filter: Filter) -> Result<usize, TenancyError> {
        self.store.count(E::TABLE, &self.scope(filter)).await
    }

    fn not_found(&self, id: &str) -> TenancyError {
        TenancyError::NotFound(format!("{} record '{}' not found", E::TABLE, id))
    }
}

/// Data access bound to one tenant
#[derive(Clone)]
pub struct TenantDataAccessor {
    store: Arc<dyn RecordStore>,
    context: TenantContext,
}

impl std::fmt::Debug for TenantDataAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDataAccessor")
            .field("tenant_id", &self.context.tenant_id)
            .field("database", &self.store.database())
            .finish()
    }
}

impl TenantDataAccessor {
    pub fn new(store: Arc<dyn RecordStore>, context: TenantContext) -> Self {
        Self { store, context }
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn tenant_id(&self) -> &str {
        &self.context.tenant_id
    }

    pub fn repository<E: Entity>(&self) -> ScopedRepository<E> {
        ScopedRepository::new(Arc::clone(&self.store), self.context.tenant_id.clone())
    }

    pub fn users(&self) -> ScopedRepository<User> {
        self.repository()
    }

    pub fn projects(&self) -> ScopedRepository<Project> {
        self.repository()
    }

    pub fn products(&self) -> ScopedRepository<Product> {
        self.repository()
    }

    pub fn categories(&self) -> ScopedRepository<Category> {
        self.repository()
    }

    pub fn orders(&self) -> ScopedRepository<Order> {
        self.repository()
    }

    /// Run a raw read. NOT tenant-scoped: the statement sees every tenant's
    /// rows sharing this database.
    pub async fn raw_query(&self, statement: &RawStatement) -> Result<RawOutcome, TenancyError> {
        self.store.raw(statement).await
    }

    /// Run a raw write. NOT tenant-scoped.
    pub async fn raw_execute(&self, statement: &RawStatement) -> Result<usize, TenancyError> {
        Ok(self.store.raw(statement).await?.affected)
    }
}
