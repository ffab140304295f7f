//! PostgreSQL backend: renders planned queries with `sql::builder` and runs them on a pool.

use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::sql::{self, PgBindValue, QueryBuf};
use crate::store::{Page, PlannedQuery, Storage};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
    model: Arc<ResolvedModel>,
}

impl PgStorage {
    pub fn new(pool: PgPool, model: Arc<ResolvedModel>) -> Self {
        PgStorage { pool, model }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        let rows = bind_all(q).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        let row = bind_all(q).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }
}

fn bind_all(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from(p));
    }
    query
}

#[async_trait]
impl Storage for PgStorage {
    async fn get(&self, query: PlannedQuery, columns: &[&str]) -> Result<Vec<Value>, AppError> {
        let q = sql::select(&self.model, &query, columns, None);
        self.fetch_all(&q).await
    }

    async fn paginate(
        &self,
        query: PlannedQuery,
        columns: &[&str],
        per_page: u64,
        page: u64,
    ) -> Result<Page<Value>, AppError> {
        let total = self.count(query.clone()).await?;
        let q = sql::select(&self.model, &query, columns, Some((per_page, Page::<Value>::offset(per_page, page))));
        let data = self.fetch_all(&q).await?;
        Ok(Page::new(data, total, per_page, page.max(1)))
    }

    async fn count(&self, query: PlannedQuery) -> Result<u64, AppError> {
        use sqlx::Row;
        let q = sql::count(&query);
        let row = bind_all(&q).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get("count")?;
        Ok(n.max(0) as u64)
    }

    async fn delete(&self, query: PlannedQuery) -> Result<u64, AppError> {
        let q = sql::delete(&query);
        let done = bind_all(&q).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn insert(&self, entity: &ResolvedEntity, data: &Map<String, Value>) -> Result<Value, AppError> {
        let q = sql::insert(entity, data);
        self.fetch_optional(&q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn update_by_key(
        &self,
        entity: &ResolvedEntity,
        id: &Value,
        data: &Map<String, Value>,
        touch: bool,
    ) -> Result<Option<Value>, AppError> {
        let q = sql::update(entity, id, data, touch);
        self.fetch_optional(&q).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

/// Try the decoders in turn; the first type that matches the column wins.
fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
