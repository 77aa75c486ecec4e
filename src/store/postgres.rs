//! PostgreSQL store over a sqlx pool. Rows come back through `row_to_json`, so every
//! column type (numeric, timestamp, json, ...) arrives as a JSON value.

use super::{RelationalStore, StoreTx};
use crate::error::AppError;
use crate::sql::{self, bind_all, bind_all_scalar, DeleteStatement, InsertStatement, Record, SelectQuery, UpdateStatement};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RelationalStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn into_records(rows: Vec<Value>) -> Vec<Record> {
    rows.into_iter()
        .filter_map(|v| match v {
            Value::Object(m) => Some(m),
            _ => None,
        })
        .collect()
}

impl PgTx {
    async fn fetch_json(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        let rows = bind_all_scalar(sqlx::query_scalar::<_, Value>(sql), params)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(into_records(rows))
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "execute");
        let done = bind_all(sqlx::query(sql), params).execute(&mut *self.tx).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn select(&mut self, query: &SelectQuery) -> Result<Vec<Record>, AppError> {
        let q = sql::select(query);
        let wrapped = format!("SELECT row_to_json(r) FROM ({}) r", q.sql);
        self.fetch_json(&wrapped, &q.params).await
    }

    async fn count(&mut self, query: &SelectQuery) -> Result<u64, AppError> {
        let q = sql::count(query);
        tracing::debug!(sql = %q.sql, params = ?q.params, "count");
        let n: i64 = bind_all_scalar(sqlx::query_scalar::<_, i64>(&q.sql), &q.params)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn insert(&mut self, stmt: &InsertStatement) -> Result<Vec<Record>, AppError> {
        if stmt.rows.is_empty() {
            return Ok(Vec::new());
        }
        let q = sql::insert(stmt);
        let wrapped = format!(
            "WITH inserted AS ({} RETURNING *) SELECT row_to_json(inserted) FROM inserted",
            q.sql
        );
        self.fetch_json(&wrapped, &q.params).await
    }

    async fn update(&mut self, stmt: &UpdateStatement) -> Result<u64, AppError> {
        let q = sql::update(stmt);
        self.execute(&q.sql, &q.params).await
    }

    async fn delete(&mut self, stmt: &DeleteStatement) -> Result<u64, AppError> {
        let q = sql::delete(stmt);
        self.execute(&q.sql, &q.params).await
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
