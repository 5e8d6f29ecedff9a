//! Record store capability and the in-process live backend
//!
//! [`RecordStore`] is the handle type the connection cache hands out. Rows
//! are JSON objects keyed by column name; filters are field equality.
//!
//! [`MemoryDatabase`] is an in-process engine partitioned by database name.
//! Partitions outlive connections, so data survives handle eviction.

use crate::TenancyError;
use crate::cache::ConnectionFactory;
use crate::config::database_name;
use crate::tenant::Tenant;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A stored record
pub type Row = Map<String, Value>;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

const MEMORY_SCHEME: &str = "memory://";

/// Field-equality filter; an empty filter matches every row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Map<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Set a condition, replacing any existing one on the same field
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| row.get(field).unwrap_or(&Value::Null) == expected)
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Statements passed straight through to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum RawStatement {
    /// Read every matching row of a table
    Scan { table: String, filter: Filter },
    /// Delete every matching row of a table
    Purge { table: String, filter: Filter },
    /// List table names
    Tables,
}

/// Result of a raw statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutcome {
    pub rows: Vec<Row>,
    pub affected: usize,
}

/// Data-store handle
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Database this handle is bound to
    fn database(&self) -> &str;

    /// Insert a row. An `id` is generated when absent; timestamps are stamped.
    async fn insert(&self, table: &str, record: Row) -> Result<Row, TenancyError>;

    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, TenancyError>;

    /// Merge `patch` into every matching row and return the updated rows
    async fn update(&self, table: &str, filter: &Filter, patch: Row)
    -> Result<Vec<Row>, TenancyError>;

    async fn delete(&self, table: &str, filter: &Filter) -> Result<usize, TenancyError>;

    async fn count(&self, table: &str, filter: &Filter) -> Result<usize, TenancyError>;

    async fn raw(&self, statement: &RawStatement) -> Result<RawOutcome, TenancyError>;

    async fn ping(&self) -> Result<(), TenancyError>;

    async fn close(&self);
}

#[derive(Default)]
struct Partition {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

/// In-process database engine
pub struct MemoryDatabase {
    name: String,
    partitions: RwLock<HashMap<String, Arc<Partition>>>,
    offline: RwLock<HashSet<String>>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: RwLock::new(HashMap::new()),
            offline: RwLock::new(HashSet::new()),
        }
    }

    /// Build from a `memory://<name>` URL
    pub fn from_url(url: &str) -> Result<Self, TenancyError> {
        let name = url.strip_prefix(MEMORY_SCHEME).ok_or_else(|| {
            TenancyError::Connectivity(format!("Unsupported data store URL '{}'", url))
        })?;
        if name.is_empty() {
            return Err(TenancyError::Connectivity(format!(
                "Data store URL '{}' names no instance",
                url
            )));
        }
        Ok(Self::new(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a connection to one database, creating it on first use
    pub fn connect(self: &Arc<Self>, database: &str) -> Result<MemoryConnection, TenancyError> {
        if self.offline.read().contains(database) {
            return Err(TenancyError::Connectivity(format!(
                "Database '{}' is unreachable",
                database
            )));
        }

        let partition = Arc::clone(
            self.partitions
                .write()
                .entry(database.to_string())
                .or_default(),
        );

        Ok(MemoryConnection {
            engine: Arc::clone(self),
            database: database.to_string(),
            partition,
            closed: AtomicBool::new(false),
        })
    }

    /// Mark a database unreachable (or reachable again)
    pub fn set_offline(&self, database: &str, offline: bool) {
        let mut set = self.offline.write();
        if offline {
            set.insert(database.to_string());
        } else {
            set.remove(database);
        }
    }

    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Connection to one [`MemoryDatabase`] partition
pub struct MemoryConnection {
    engine: Arc<MemoryDatabase>,
    database: String,
    partition: Arc<Partition>,
    closed: AtomicBool,
}

impl MemoryConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), TenancyError> {
        if self.is_closed() {
            return Err(TenancyError::Storage(format!(
                "Connection to '{}' is closed",
                self.database
            )));
        }
        Ok(())
    }
}

fn now_stamp() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

fn needs_id(row: &Row) -> bool {
    match row.get(ID_COLUMN) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

#[async_trait]
impl RecordStore for MemoryConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn insert(&self, table: &str, mut record: Row) -> Result<Row, TenancyError> {
        self.ensure_open()?;

        if needs_id(&record) {
            record.insert(
                ID_COLUMN.to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        let now = now_stamp();
        if !matches!(record.get(CREATED_AT_COLUMN), Some(v) if !v.is_null()) {
            record.insert(CREATED_AT_COLUMN.to_string(), now.clone());
        }
        record.insert(UPDATED_AT_COLUMN.to_string(), now);

        let mut tables = self.partition.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|row| row.get(ID_COLUMN) == record.get(ID_COLUMN)) {
            return Err(TenancyError::Conflict(format!(
                "Duplicate id in table '{}'",
                table
            )));
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, TenancyError> {
        self.ensure_open()?;
        let tables = self.partition.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|row| filter.matches(row))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Row,
    ) -> Result<Vec<Row>, TenancyError> {
        self.ensure_open()?;
        let now = now_stamp();
        let mut tables = self.partition.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| filter.matches(row)) {
            for (field, value) in &patch {
                if field != ID_COLUMN {
                    row.insert(field.clone(), value.clone());
                }
            }
            row.insert(UPDATED_AT_COLUMN.to_string(), now.clone());
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<usize, TenancyError> {
        self.ensure_open()?;
        let mut tables = self.partition.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok(before - rows.len())
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<usize, TenancyError> {
        self.ensure_open()?;
        let tables = self.partition.tables.read();
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).count())
            .unwrap_or(0))
    }

    async fn raw(&self, statement: &RawStatement) -> Result<RawOutcome, TenancyError> {
        match statement {
            RawStatement::Scan { table, filter } => {
                let rows = self.select(table, filter, None).await?;
                Ok(RawOutcome {
                    affected: rows.len(),
                    rows,
                })
            }
            RawStatement::Purge { table, filter } => Ok(RawOutcome {
                rows: Vec::new(),
                affected: self.delete(table, filter).await?,
            }),
            RawStatement::Tables => {
                self.ensure_open()?;
                let tables = self.partition.tables.read();
                let mut names: Vec<&String> = tables.keys().collect();
                names.sort();
                Ok(RawOutcome {
                    rows: names
                        .into_iter()
                        .map(|name| {
                            let mut row = Row::new();
                            row.insert("name".to_string(), Value::String(name.clone()));
                            row
                        })
                        .collect(),
                    affected: 0,
                })
            }
        }
    }

    async fn ping(&self) -> Result<(), TenancyError> {
        if self.is_closed() {
            return Err(TenancyError::Connectivity(format!(
                "Connection to '{}' is closed",
                self.database
            )));
        }
        if self.engine.offline.read().contains(&self.database) {
            return Err(TenancyError::Connectivity(format!(
                "Database '{}' is unreachable",
                self.database
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(database = %self.database, "Connection closed");
        }
    }
}

/// Live [`ConnectionFactory`]: one [`MemoryConnection`] per tenant database
pub struct MemoryConnector {
    engine: Arc<MemoryDatabase>,
    database_pattern: String,
}

impl MemoryConnector {
    pub fn new(engine: Arc<MemoryDatabase>, database_pattern: impl Into<String>) -> Self {
        Self {
            engine,
            database_pattern: database_pattern.into(),
        }
    }

    pub fn engine(&self) -> &Arc<MemoryDatabase> {
        &self.engine
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnector {
    type Handle = dyn RecordStore;

    async fn connect(&self, tenant: &Tenant) -> Result<Arc<Self::Handle>, TenancyError> {
        let database = database_name(&self.database_pattern, tenant);
        debug!(tenant_id = %tenant.id, database = %database, "Opening connection");
        let connection = self.engine.connect(&database)?;
        Ok(Arc::new(connection))
    }

    async fn probe(&self, handle: &Self::Handle) -> Result<(), TenancyError> {
        handle.ping().await
    }

    async fn dispose(&self, handle: &Self::Handle) {
        handle.close().await;
    }
}
