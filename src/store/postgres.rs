//! PostgreSQL document store
//!
//! One `documents` table keyed by `(collection, id)` with a `jsonb` body.
//! Field names and values are always bound parameters.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    into_object, timestamp, timestamp_string, AverageSpec, Direction, Document, DocumentStore, FilterOp, Query, StoreError,
    StoreResult, CREATED_AT, UNIQUE_FIELDS, UPDATED_AT,
};

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: Value,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self { id: row.id, data: row.data }
    }
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn exists(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

/// Unique-index violations (SQLSTATE 23505) become `Conflict`; anything
/// else stays a database error.
fn conflict_or(collection: &str, err: sqlx::Error) -> StoreError {
    let field = err
        .as_database_error()
        .filter(|db| db.code().as_deref() == Some("23505"))
        .map(|db| unique_field(collection, db.constraint()));
    match field {
        Some(field) => StoreError::Conflict { collection: collection.to_string(), field },
        None => StoreError::Database(err),
    }
}

fn unique_field(collection: &str, constraint: Option<&str>) -> String {
    UNIQUE_FIELDS
        .iter()
        .find(|(c, f)| *c == collection && constraint.map_or(true, |name| name.contains(*f)))
        .map(|(_, f)| f.to_string())
        .or_else(|| constraint.map(str::to_string))
        .unwrap_or_else(|| "id".to_string())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(&self, collection: &str, data: Value) -> StoreResult<Document> {
        let now = Utc::now();
        let mut map = into_object(collection, data)?;
        map.insert(CREATED_AT.to_string(), timestamp(now));
        map.insert(UPDATED_AT.to_string(), timestamp(now));
        let row = sqlx::query_as::<_, DocumentRow>(
            "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES ($1, $2, $3, $4, $4) RETURNING id, data",
        )
        .bind(collection)
        .bind(Uuid::now_v7().to_string())
        .bind(Value::Object(map))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(collection, e))?;
        Ok(row.into())
    }

    async fn upsert(&self, collection: &str, id: &str, data: Value) -> StoreResult<Document> {
        let now = Utc::now();
        let mut map = into_object(collection, data)?;
        map.insert(CREATED_AT.to_string(), timestamp(now));
        map.insert(UPDATED_AT.to_string(), timestamp(now));
        let row = sqlx::query_as::<_, DocumentRow>(
            "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES ($1, $2, $3, $4, $4) \
             ON CONFLICT (collection, id) DO UPDATE \
             SET data = documents.data || (EXCLUDED.data - 'createdAt'), updated_at = EXCLUDED.updated_at \
             RETURNING id, data",
        )
        .bind(collection)
        .bind(id)
        .bind(Value::Object(map))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(collection, e))?;
        Ok(row.into())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Document> {
        sqlx::query_as::<_, DocumentRow>("SELECT id, data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Into::into)
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> StoreResult<Document> {
        let now = Utc::now();
        let mut map = into_object(collection, patch)?;
        map.remove(CREATED_AT);
        map.insert(UPDATED_AT.to_string(), timestamp(now));
        sqlx::query_as::<_, DocumentRow>(
            "UPDATE documents SET data = data || $3, updated_at = $4 WHERE collection = $1 AND id = $2 RETURNING id, data",
        )
        .bind(collection)
        .bind(id)
        .bind(Value::Object(map))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or(collection, e))?
        .map(Into::into)
        .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string());
        for filter in &query.filters {
            qb.push(" AND data -> ").push_bind(filter.field.clone());
            match filter.op {
                FilterOp::In => {
                    qb.push(" IN (SELECT jsonb_array_elements(")
                        .push_bind(filter.value.clone())
                        .push("))");
                }
                op => {
                    qb.push(" ").push(op.sql()).push(" ").push_bind(filter.value.clone());
                }
            }
        }
        match &query.order_by {
            Some((field, direction)) => {
                qb.push(" ORDER BY data -> ").push_bind(field.clone()).push(match direction {
                    Direction::Asc => " ASC NULLS LAST",
                    Direction::Desc => " DESC NULLS LAST",
                });
                qb.push(", created_at, id");
            }
            None => {
                qb.push(" ORDER BY created_at, id");
            }
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        let rows = qb.build_query_as::<DocumentRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE collection = $1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> StoreResult<Document> {
        let now = Utc::now();
        sqlx::query_as::<_, DocumentRow>(
            "UPDATE documents SET \
               data = jsonb_set(data, ARRAY[$3], to_jsonb(COALESCE((data ->> $3)::bigint, 0) + $4)) \
                      || jsonb_build_object('updatedAt', $5::text), \
               updated_at = $6 \
             WHERE collection = $1 AND id = $2 RETURNING id, data",
        )
        .bind(collection)
        .bind(id)
        .bind(field)
        .bind(delta)
        .bind(timestamp_string(now))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .map(Into::into)
        .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn increment_if_below(
        &self,
        collection: &str,
        id: &str,
        counter: &str,
        limit: &str,
    ) -> StoreResult<Document> {
        let now = Utc::now();
        // Check and increment happen in one statement, so concurrent
        // redemptions serialize on the row lock.
        let row = sqlx::query_as::<_, DocumentRow>(
            "UPDATE documents SET \
               data = jsonb_set(data, ARRAY[$3], to_jsonb(COALESCE((data ->> $3)::bigint, 0) + 1)) \
                      || jsonb_build_object('updatedAt', $5::text), \
               updated_at = $6 \
             WHERE collection = $1 AND id = $2 \
               AND (jsonb_typeof(data -> $4) IS DISTINCT FROM 'number' \
                    OR COALESCE((data ->> $3)::bigint, 0) < (data ->> $4)::numeric) \
             RETURNING id, data",
        )
        .bind(collection)
        .bind(id)
        .bind(counter)
        .bind(limit)
        .bind(timestamp_string(now))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None if self.exists(collection, id).await? => Err(StoreError::ConditionFailed {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            None => Err(StoreError::not_found(collection, id)),
        }
    }

    async fn store_average(&self, collection: &str, id: &str, spec: AverageSpec<'_>) -> StoreResult<Document> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Lock the target first. The aggregate below runs as a later
        // statement, so its snapshot includes every source row committed
        // before the lock was granted.
        let locked: Option<(String,)> =
            sqlx::query_as("SELECT id FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::not_found(collection, id));
        }

        let row = sqlx::query_as::<_, DocumentRow>(
            "UPDATE documents SET \
               data = jsonb_set(data, ARRAY[$3], ( \
                        SELECT jsonb_build_object( \
                                 'average', COALESCE(AVG((s.data ->> $6)::float8), 0), \
                                 'count', COUNT(*)) \
                        FROM documents s \
                        WHERE s.collection = $4 AND s.data ->> $5 = $2 \
                          AND jsonb_typeof(s.data -> $6) = 'number')) \
                      || jsonb_build_object('updatedAt', $7::text), \
               updated_at = $8 \
             WHERE collection = $1 AND id = $2 RETURNING id, data",
        )
        .bind(collection)
        .bind(id)
        .bind(spec.field)
        .bind(spec.source)
        .bind(spec.key)
        .bind(spec.value)
        .bind(timestamp_string(now))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_names_the_field() {
        assert_eq!(unique_field("coupons", Some("coupons_code_idx")), "code");
        assert_eq!(unique_field("coupons", None), "code");
        assert_eq!(unique_field("things", Some("documents_pkey")), "documents_pkey");
        assert_eq!(unique_field("things", None), "id");
    }

    #[test]
    fn test_other_errors_stay_database_errors() {
        assert!(matches!(conflict_or("coupons", sqlx::Error::RowNotFound), StoreError::Database(_)));
    }
}
