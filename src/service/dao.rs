//! Logical data access over one open store transaction.

use crate::error::AppError;
use crate::metadata::TableSchema;
use crate::sql::{DeleteStatement, Filter, InsertStatement, Predicate, Record, SelectQuery, UpdateStatement};
use crate::store::StoreTx;
use serde_json::Value;

pub struct BaseDao<'a> {
    tx: &'a mut dyn StoreTx,
}

impl<'a> BaseDao<'a> {
    pub fn new(tx: &'a mut dyn StoreTx) -> Self {
        BaseDao { tx }
    }

    /// One page of `query`; `page_index` is 1-based.
    pub async fn query_list(
        &mut self,
        query: SelectQuery,
        page_index: u64,
        page_size: u64,
    ) -> Result<Vec<Record>, AppError> {
        let offset = page_index.saturating_sub(1).saturating_mul(page_size);
        self.tx.select(&query.page(page_size, offset)).await
    }

    pub async fn count(&mut self, query: &SelectQuery) -> Result<u64, AppError> {
        self.tx.count(query).await
    }

    pub async fn find_by_key(&mut self, schema: &TableSchema, key: &Value) -> Result<Option<Record>, AppError> {
        let query = SelectQuery::new(&schema.table)
            .filter(Filter::new().and(Predicate::eq(&schema.primary_key, key.clone())))
            .casts(schema.casts())
            .page(1, 0);
        Ok(self.tx.select(&query).await?.into_iter().next())
    }

    pub async fn insert(&mut self, schema: &TableSchema, row: Record) -> Result<Record, AppError> {
        self.insert_batch(schema, vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Store(format!("insert into {} returned no row", schema.table)))
    }

    /// All rows must carry the same columns as the first one.
    pub async fn insert_batch(&mut self, schema: &TableSchema, rows: Vec<Record>) -> Result<Vec<Record>, AppError> {
        let Some(first) = rows.first() else {
            return Err(AppError::BadRequest("nothing to insert".into()));
        };
        let columns: Vec<String> = first.keys().cloned().collect();
        if columns.is_empty() {
            return Err(AppError::BadRequest("nothing to insert".into()));
        }
        if rows
            .iter()
            .any(|r| r.len() != columns.len() || columns.iter().any(|c| !r.contains_key(c)))
        {
            return Err(AppError::BadRequest("batch rows must carry the same fields".into()));
        }
        let stmt = InsertStatement {
            table: schema.table.clone(),
            key_column: schema.primary_key.clone(),
            columns,
            rows,
            casts: schema.casts(),
        };
        self.tx.insert(&stmt).await
    }

    pub async fn update(&mut self, schema: &TableSchema, row: Record, key: &Value) -> Result<u64, AppError> {
        if row.keys().all(|k| *k == schema.primary_key) {
            return Err(AppError::BadRequest("nothing to update".into()));
        }
        let stmt = UpdateStatement {
            table: schema.table.clone(),
            values: row,
            key_column: schema.primary_key.clone(),
            key: key.clone(),
            casts: schema.casts(),
        };
        self.tx.update(&stmt).await
    }

    pub async fn delete(&mut self, schema: &TableSchema, key: &Value) -> Result<u64, AppError> {
        let stmt = DeleteStatement {
            table: schema.table.clone(),
            key_column: schema.primary_key.clone(),
            key: key.clone(),
            casts: schema.casts(),
        };
        self.tx.delete(&stmt).await
    }
}
