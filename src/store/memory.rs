//! In-process document store
//!
//! Backs local development when no `DATABASE_URL` is configured, and the
//! test suites. Documents keep insertion order per collection.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    into_object, timestamp, AverageSpec, Direction, Document, DocumentStore, Filter, FilterOp, Query, StoreError,
    StoreResult, CREATED_AT, UNIQUE_FIELDS, UPDATED_AT,
};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn matches(data: &Value, filter: &Filter) -> bool {
    let Some(field) = data.get(&filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => values_equal(field, &filter.value),
        FilterOp::In => filter
            .value
            .as_array()
            .is_some_and(|options| options.iter().any(|v| values_equal(field, v))),
        FilterOp::Lt => compare(field, &filter.value) == Some(Ordering::Less),
        FilterOp::Le => matches!(compare(field, &filter.value), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Gt => compare(field, &filter.value) == Some(Ordering::Greater),
        FilterOp::Ge => matches!(compare(field, &filter.value), Some(Ordering::Greater | Ordering::Equal)),
    }
}

fn merge(target: &mut Value, patch: Map<String, Value>) {
    if let Value::Object(map) = target {
        map.extend(patch);
    }
}

/// Reject a write that would give `id` a unique field value another
/// document in the collection already holds.
fn check_unique(collection: &str, docs: &[Document], id: &str, fields: &Map<String, Value>) -> StoreResult<()> {
    for (_, field) in UNIQUE_FIELDS.iter().filter(|(c, _)| *c == collection) {
        let Some(value) = fields.get(*field).filter(|v| !v.is_null()) else {
            continue;
        };
        if docs.iter().any(|d| d.id != id && d.data.get(*field) == Some(value)) {
            return Err(StoreError::Conflict { collection: collection.to_string(), field: field.to_string() });
        }
    }
    Ok(())
}

fn as_i64(value: Option<&Value>) -> i64 {
    value.and_then(Value::as_i64).unwrap_or(0)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, data: Value) -> StoreResult<Document> {
        let mut map = into_object(collection, data)?;
        let now = timestamp(Utc::now());
        map.insert(CREATED_AT.to_string(), now.clone());
        map.insert(UPDATED_AT.to_string(), now);
        let doc = Document { id: Uuid::now_v7().to_string(), data: Value::Object(map) };
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        if let Value::Object(fields) = &doc.data {
            check_unique(collection, docs, &doc.id, fields)?;
        }
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn upsert(&self, collection: &str, id: &str, data: Value) -> StoreResult<Document> {
        let mut map = into_object(collection, data)?;
        let now = timestamp(Utc::now());
        map.remove(CREATED_AT);
        map.insert(UPDATED_AT.to_string(), now.clone());
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        check_unique(collection, docs, id, &map)?;
        if let Some(doc) = docs.iter_mut().find(|d| d.id == id) {
            merge(&mut doc.data, map);
            return Ok(doc.clone());
        }
        map.insert(CREATED_AT.to_string(), now);
        let doc = Document { id: id.to_string(), data: Value::Object(map) };
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Document> {
        let guard = self.collections.read().await;
        guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<Document> {
        let mut patch = into_object(collection, patch)?;
        patch.remove(CREATED_AT);
        patch.insert(UPDATED_AT.to_string(), timestamp(Utc::now()));
        let mut guard = self.collections.write().await;
        let docs = guard
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        check_unique(collection, docs, id, &patch)?;
        let doc = docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        merge(&mut doc.data, patch);
        Ok(doc.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        let docs = guard
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() == before {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let guard = self.collections.read().await;
        let mut found: Vec<Document> = guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| query.filters.iter().all(|f| matches(&d.data, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            // Stable sort keeps creation order among ties; missing fields sort last.
            found.sort_by(|a, b| match (a.data.get(field), b.data.get(field)) {
                (Some(x), Some(y)) => {
                    let ord = compare(x, y).unwrap_or(Ordering::Equal);
                    match direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        let guard = self.collections.read().await;
        Ok(guard.get(collection).map_or(0, |docs| docs.len() as u64))
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> StoreResult<Document> {
        let mut guard = self.collections.write().await;
        let doc = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let next = as_i64(doc.data.get(field)) + delta;
        let mut patch = Map::new();
        patch.insert(field.to_string(), Value::from(next));
        patch.insert(UPDATED_AT.to_string(), timestamp(Utc::now()));
        merge(&mut doc.data, patch);
        Ok(doc.clone())
    }

    async fn increment_if_below(
        &self,
        collection: &str,
        id: &str,
        counter: &str,
        limit: &str,
    ) -> StoreResult<Document> {
        // The write lock spans the check and the increment.
        let mut guard = self.collections.write().await;
        let doc = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let current = as_i64(doc.data.get(counter));
        if let Some(max) = doc.data.get(limit).and_then(Value::as_i64) {
            if current >= max {
                return Err(StoreError::ConditionFailed {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
        }
        let mut patch = Map::new();
        patch.insert(counter.to_string(), Value::from(current + 1));
        patch.insert(UPDATED_AT.to_string(), timestamp(Utc::now()));
        merge(&mut doc.data, patch);
        Ok(doc.clone())
    }

    async fn store_average(&self, collection: &str, id: &str, spec: AverageSpec<'_>) -> StoreResult<Document> {
        // One write lock covers reading the sources and writing the target.
        let mut guard = self.collections.write().await;
        let key = Value::String(id.to_string());
        let (sum, count) = guard
            .get(spec.source)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.data.get(spec.key) == Some(&key))
                    .filter_map(|d| d.data.get(spec.value).and_then(Value::as_f64))
                    .fold((0.0, 0u64), |(sum, count), v| (sum + v, count + 1))
            })
            .unwrap_or((0.0, 0));
        let average = if count == 0 { 0.0 } else { sum / count as f64 };

        let doc = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let mut patch = Map::new();
        patch.insert(spec.field.to_string(), json!({ "average": average, "count": count }));
        patch.insert(UPDATED_AT.to_string(), timestamp(Utc::now()));
        merge(&mut doc.data, patch);
        Ok(doc.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_crud_lifecycle() {
        let store = MemoryStore::new();
        let doc = store.create("things", json!({"name": "a", "n": 1})).await.unwrap();
        assert!(doc.data.get(CREATED_AT).is_some());

        let updated = store.update("things", &doc.id, json!({"n": 2})).await.unwrap();
        assert_eq!(updated.data["n"], json!(2));
        assert_eq!(updated.data["name"], json!("a"));

        store.delete("things", &doc.id).await.unwrap();
        assert!(matches!(store.get("things", &doc.id).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete("things", &doc.id).await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unique_coupon_code() {
        let store = MemoryStore::new();
        let first = store.create("coupons", json!({"code": "SAVE10"})).await.unwrap();
        let second = store.create("coupons", json!({"code": "SAVE20"})).await.unwrap();
        assert!(matches!(
            store.create("coupons", json!({"code": "SAVE10"})).await,
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            store.update("coupons", &second.id, json!({"code": "SAVE10"})).await,
            Err(StoreError::Conflict { .. })
        ));
        // Rewriting a document's own code is fine, and other collections are unconstrained.
        store.update("coupons", &first.id, json!({"code": "SAVE10"})).await.unwrap();
        store.create("things", json!({"code": "SAVE10"})).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_filters_order_and_limit() {
        let store = MemoryStore::new();
        for (name, sales, status) in [("a", 5, "open"), ("b", 9, "done"), ("c", 1, "done"), ("d", 7, "open")] {
            store.create("p", json!({"name": name, "sales": sales, "status": status})).await.unwrap();
        }
        store.create("p", json!({"name": "e", "status": "done"})).await.unwrap();

        let done = store.query("p", &Query::new().eq("status", "done")).await.unwrap();
        let names: Vec<_> = done.iter().map(|d| d.data["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["b", "c", "e"]);

        let top = store
            .query("p", &Query::new().order_by("sales", Direction::Desc).limit(3))
            .await
            .unwrap();
        let names: Vec<_> = top.iter().map(|d| d.data["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["b", "d", "a"]);

        let some = store
            .query("p", &Query::new().filter("name", FilterOp::In, json!(["a", "e"])))
            .await
            .unwrap();
        assert_eq!(some.len(), 2);

        let cheap = store.query("p", &Query::new().filter("sales", FilterOp::Lt, 6)).await.unwrap();
        assert_eq!(cheap.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_merges_and_keeps_created_at() {
        let store = MemoryStore::new();
        let first = store.upsert("users", "u1", json!({"email": "a@x.io", "role": "customer"})).await.unwrap();
        let second = store.upsert("users", "u1", json!({"phone": "555"})).await.unwrap();
        assert_eq!(second.data["email"], json!("a@x.io"));
        assert_eq!(second.data["phone"], json!("555"));
        assert_eq!(second.data[CREATED_AT], first.data[CREATED_AT]);
        assert_eq!(store.count("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_if_below_respects_limit() {
        let store = MemoryStore::new();
        let doc = store.create("coupons", json!({"usageCount": 1, "usageLimit": 2})).await.unwrap();
        let bumped = store.increment_if_below("coupons", &doc.id, "usageCount", "usageLimit").await.unwrap();
        assert_eq!(bumped.data["usageCount"], json!(2));
        let refused = store.increment_if_below("coupons", &doc.id, "usageCount", "usageLimit").await;
        assert!(matches!(refused, Err(StoreError::ConditionFailed { .. })));

        let unlimited = store.create("coupons", json!({"usageLimit": null})).await.unwrap();
        let bumped = store.increment_if_below("coupons", &unlimited.id, "usageCount", "usageLimit").await.unwrap();
        assert_eq!(bumped.data["usageCount"], json!(1));
    }

    const RATINGS: AverageSpec<'static> =
        AverageSpec { source: "reviews", key: "productId", value: "rating", field: "ratings" };

    #[tokio::test]
    async fn test_store_average() {
        let store = MemoryStore::new();
        let product = store.create("products", json!({"name": "Mug"})).await.unwrap();
        for rating in [4, 5, 3] {
            store.create("reviews", json!({"productId": product.id, "rating": rating})).await.unwrap();
        }
        store.create("reviews", json!({"productId": "other", "rating": 1})).await.unwrap();

        let doc = store.store_average("products", &product.id, RATINGS).await.unwrap();
        assert_eq!(doc.data["ratings"], json!({"average": 4.0, "count": 3}));
        assert_eq!(doc.data["name"], json!("Mug"));

        let empty = store.create("products", json!({"name": "Teapot"})).await.unwrap();
        let doc = store.store_average("products", &empty.id, RATINGS).await.unwrap();
        assert_eq!(doc.data["ratings"], json!({"average": 0.0, "count": 0}));

        let missing = store.store_average("products", "gone", RATINGS).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_conditional_increments_never_exceed_limit() {
        let store = Arc::new(MemoryStore::new());
        let doc = store.create("coupons", json!({"usageCount": 0, "usageLimit": 5})).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            let id = doc.id.clone();
            handles.push(tokio::spawn(async move {
                store.increment_if_below("coupons", &id, "usageCount", "usageLimit").await.is_ok()
            }));
        }
        let mut granted = 0;
        for h in handles {
            if h.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(store.get("coupons", &doc.id).await.unwrap().data["usageCount"], json!(5));
    }
}
