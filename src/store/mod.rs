//! Document store delegate
//!
//! Collections of JSON documents keyed by string ids. Two backends:
//! - [`PgDocumentStore`]: PostgreSQL `jsonb`, the production store
//! - [`MemoryStore`]: process-local, for development and tests
//!
//! Handlers never touch a backend directly; they go through a typed
//! [`Collection`] built from the `Arc<dyn DocumentStore>` held in `AppState`.

pub mod memory;
pub mod postgres;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// Store-managed creation timestamp field.
pub const CREATED_AT: &str = "createdAt";
/// Store-managed modification timestamp field.
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{collection} not found: {id}")]
    NotFound { collection: String, id: String },

    #[error("Condition not met for {collection}/{id}")]
    ConditionFailed { collection: String, id: String },

    #[error("Unique field {field} already taken in {collection}")]
    Conflict { collection: String, field: String },

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound { collection: collection.to_string(), id: id.to_string() }
    }
}

/// Fields that must be unique within a collection. Postgres enforces these
/// with partial unique indexes (see `migrations/`).
pub const UNIQUE_FIELDS: &[(&str, &str)] = &[("coupons", "code")];

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A stored document: its id plus the JSON object body.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    /// Field value is one of the elements of a JSON array.
    In,
}

impl FilterOp {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "IN",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Filters are ANDed. Without `order_by`, results come back in creation order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter { field: field.to_string(), op, value: value.into() });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Average of a numeric field across the documents that point at a target.
///
/// The result is written onto the target as `{"average": f64, "count": n}`
/// under `field`. Documents whose `value` is missing or not a number are
/// ignored; none at all gives `{0, 0}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AverageSpec<'a> {
    /// Collection holding the rated documents.
    pub source: &'a str,
    /// Field in `source` holding the target id.
    pub key: &'a str,
    /// Numeric field in `source` to average.
    pub value: &'a str,
    /// Field on the target receiving the summary.
    pub field: &'a str,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `data` under a freshly generated id.
    async fn create(&self, collection: &str, data: Value) -> StoreResult<Document>;

    /// Insert or shallow-merge `data` under a caller-chosen id.
    async fn upsert(&self, collection: &str, id: &str, data: Value) -> StoreResult<Document>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Document>;

    /// Shallow merge of `patch` into the stored object.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<Document>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str) -> StoreResult<u64>;

    /// Add `delta` to a numeric field (missing counts as zero).
    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> StoreResult<Document>;

    /// Atomically increment `counter` by one iff `limit` is absent or
    /// `counter < limit`. Fails with [`StoreError::ConditionFailed`] otherwise.
    async fn increment_if_below(
        &self,
        collection: &str,
        id: &str,
        counter: &str,
        limit: &str,
    ) -> StoreResult<Document>;

    /// Recompute `spec` for `collection/id` and write it in one atomic step:
    /// concurrent calls for the same target serialize, and each one sees
    /// every source document committed before it started.
    async fn store_average(&self, collection: &str, id: &str, spec: AverageSpec<'_>) -> StoreResult<Document>;
}

/// Timestamps are stored as fixed-width RFC 3339 strings so that they sort
/// lexicographically in both backends.
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(timestamp_string(at))
}

pub(crate) fn timestamp_string(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn into_object(collection: &str, data: Value) -> StoreResult<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed(format!(
            "{collection} documents must be JSON objects, got {other}"
        ))),
    }
}

/// Typed record living in a named collection.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;
}

pub fn from_document<T: Entity>(doc: Document) -> StoreResult<T> {
    let Document { id, data } = doc;
    let mut map = into_object(T::COLLECTION, data)?;
    map.insert("id".to_string(), Value::String(id.clone()));
    serde_json::from_value(Value::Object(map))
        .map_err(|e| StoreError::Malformed(format!("{}/{id}: {e}", T::COLLECTION)))
}

/// Serialize a record for writing. The id and store-managed timestamps are
/// stripped; the store owns them.
pub fn to_data<T: Serialize>(value: &T) -> StoreResult<Value> {
    let value = serde_json::to_value(value).map_err(|e| StoreError::Malformed(e.to_string()))?;
    let mut map = into_object("record", value)?;
    map.remove("id");
    map.remove(CREATED_AT);
    map.remove(UPDATED_AT);
    Ok(Value::Object(map))
}

/// Typed view over one collection.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), _entity: PhantomData }
    }
}

impl<T: Entity> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, _entity: PhantomData }
    }

    /// Insert a new record. `record` may be the entity itself or an input
    /// type carrying fields the entity never reads back.
    pub async fn create<P: Serialize>(&self, record: &P) -> StoreResult<T> {
        from_document(self.store.create(T::COLLECTION, to_data(record)?).await?)
    }

    pub async fn upsert<P: Serialize>(&self, id: &str, record: &P) -> StoreResult<T> {
        from_document(self.store.upsert(T::COLLECTION, id, to_data(record)?).await?)
    }

    pub async fn get(&self, id: &str) -> StoreResult<T> {
        from_document(self.store.get(T::COLLECTION, id).await?)
    }

    /// Apply a partial update. `patch` is any serializable value that renders
    /// as a JSON object; `None` fields should be skipped by the caller's serde
    /// attributes.
    pub async fn update<P: Serialize>(&self, id: &str, patch: &P) -> StoreResult<T> {
        from_document(self.store.update(T::COLLECTION, id, to_data(patch)?).await?)
    }

    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store.delete(T::COLLECTION, id).await
    }

    pub async fn query(&self, query: &Query) -> StoreResult<Vec<T>> {
        self.store
            .query(T::COLLECTION, query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn all(&self) -> StoreResult<Vec<T>> {
        self.query(&Query::new()).await
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.store.count(T::COLLECTION).await
    }

    pub async fn increment(&self, id: &str, field: &str, delta: i64) -> StoreResult<T> {
        from_document(self.store.increment(T::COLLECTION, id, field, delta).await?)
    }

    pub async fn increment_if_below(&self, id: &str, counter: &str, limit: &str) -> StoreResult<T> {
        from_document(self.store.increment_if_below(T::COLLECTION, id, counter, limit).await?)
    }

    pub async fn store_average(&self, id: &str, spec: AverageSpec<'_>) -> StoreResult<T> {
        from_document(self.store.store_average(T::COLLECTION, id, spec).await?)
    }
}
