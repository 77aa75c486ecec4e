//! In-memory store for tests and embedding without a database.
//!
//! A transaction works on a private copy of the tables it touches and writes them back
//! on commit; a dropped transaction leaves the shared tables unchanged. Joins and
//! grouping are not evaluated.

use super::{RelationalStore, StoreTx};
use crate::error::AppError;
use crate::sql::{compare_values, DeleteStatement, InsertStatement, Record, SelectQuery, UpdateStatement};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, Default)]
struct MemTable {
    rows: Vec<Record>,
    last_key: i64,
}

impl MemTable {
    fn next_key(&mut self, key_column: &str) -> i64 {
        let max_existing = self
            .rows
            .iter()
            .filter_map(|r| r.get(key_column).and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        self.last_key = self.last_key.max(max_existing) + 1;
        self.last_key
    }
}

type Tables = HashMap<String, MemTable>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends rows to `table` outside any transaction.
    pub fn seed(&self, table: &str, rows: Vec<Record>) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.entry(table.to_string()).or_default().rows.extend(rows);
        }
    }

    /// Committed rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .ok()
            .and_then(|t| t.get(table).map(|t| t.rows.clone()))
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Result<Tables, AppError> {
        self.tables
            .lock()
            .map(|t| t.clone())
            .map_err(|_| AppError::Store("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        Ok(Box::new(MemoryTx {
            shared: self.tables.clone(),
            working: self.snapshot()?,
            touched: Vec::new(),
        }))
    }
}

struct MemoryTx {
    shared: Arc<Mutex<Tables>>,
    working: Tables,
    touched: Vec<String>,
}

impl MemoryTx {
    fn table_mut(&mut self, table: &str) -> &mut MemTable {
        if !self.touched.iter().any(|t| t == table) {
            self.touched.push(table.to_string());
        }
        self.working.entry(table.to_string()).or_default()
    }

    fn matching(&self, query: &SelectQuery) -> Vec<Record> {
        self.working
            .get(&query.table)
            .map(|t| t.rows.iter().filter(|r| query.filter.matches(r)).cloned().collect())
            .unwrap_or_default()
    }
}

fn key_matches(row: &Record, key_column: &str, key: &Value) -> bool {
    row.get(key_column)
        .map(|v| compare_values(v, key) == Some(Ordering::Equal))
        .unwrap_or(false)
}

/// Nulls sort last in ascending order.
fn compare_for_sort(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn select(&mut self, query: &SelectQuery) -> Result<Vec<Record>, AppError> {
        let mut rows = self.matching(query);
        rows.sort_by(|a, b| {
            for key in &query.sort {
                let col = key.column.rsplit('.').next().unwrap_or(&key.column);
                let x = a.get(col).unwrap_or(&Value::Null);
                let y = b.get(col).unwrap_or(&Value::Null);
                let ord = compare_for_sort(x, y);
                let ord = if key.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|n| n as usize).unwrap_or(usize::MAX);
        let page = rows.into_iter().skip(offset).take(limit);
        if query.columns.is_empty() {
            return Ok(page.collect());
        }
        Ok(page
            .map(|row| {
                query
                    .columns
                    .iter()
                    .map(|c| {
                        let name = c.rsplit('.').next().unwrap_or(c);
                        (name.to_string(), row.get(name).cloned().unwrap_or(Value::Null))
                    })
                    .collect()
            })
            .collect())
    }

    async fn count(&mut self, query: &SelectQuery) -> Result<u64, AppError> {
        Ok(self.matching(query).len() as u64)
    }

    async fn insert(&mut self, stmt: &InsertStatement) -> Result<Vec<Record>, AppError> {
        let table = self.table_mut(&stmt.table);
        let mut stored = Vec::with_capacity(stmt.rows.len());
        for row in &stmt.rows {
            let mut row: Record = stmt
                .columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect();
            let missing_key = row.get(&stmt.key_column).map(Value::is_null).unwrap_or(true);
            if missing_key {
                let key = table.next_key(&stmt.key_column);
                row.insert(stmt.key_column.clone(), Value::from(key));
            } else if table.rows.iter().any(|r| key_matches(r, &stmt.key_column, &row[&stmt.key_column])) {
                return Err(AppError::Store(format!(
                    "duplicate key {} in {}",
                    row[&stmt.key_column], stmt.table
                )));
            }
            table.rows.push(row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    async fn update(&mut self, stmt: &UpdateStatement) -> Result<u64, AppError> {
        let table = self.table_mut(&stmt.table);
        let mut n = 0;
        for row in table.rows.iter_mut().filter(|r| key_matches(r, &stmt.key_column, &stmt.key)) {
            for (k, v) in &stmt.values {
                if *k != stmt.key_column {
                    row.insert(k.clone(), v.clone());
                }
            }
            n += 1;
        }
        Ok(n)
    }

    async fn delete(&mut self, stmt: &DeleteStatement) -> Result<u64, AppError> {
        let table = self.table_mut(&stmt.table);
        let before = table.rows.len();
        table.rows.retain(|r| !key_matches(r, &stmt.key_column, &stmt.key));
        Ok((before - table.rows.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { shared, mut working, touched } = *self;
        let mut tables = shared
            .lock()
            .map_err(|_| AppError::Store("memory store lock poisoned".into()))?;
        for name in touched {
            if let Some(t) = working.remove(&name) {
                tables.insert(name, t);
            }
        }
        Ok(())
    }
}
