//! Resolved table schema: catalog rows validated and flattened for runtime use.

use crate::error::AppError;
use crate::metadata::{ColumnAttribute, JoinSpec, MetadataRepository, TableConfig, ValidationRule};
use crate::sql::Casts;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub const CREATE_TIME: &str = "create_time";
pub const UPDATE_TIME: &str = "update_time";
pub const CREATE_BY: &str = "create_by";
pub const UPDATE_BY: &str = "update_by";

#[derive(Clone, Debug)]
pub struct TableSchema {
    pub table: String,
    /// Columns in metadata order (`order_no`, then name).
    pub columns: Vec<ColumnAttribute>,
    pub rules: Vec<ValidationRule>,
    pub config: TableConfig,
    pub primary_key: String,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnAttribute> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn searchable(&self) -> Vec<&ColumnAttribute> {
        self.columns.iter().filter(|c| c.search_flag).collect()
    }

    /// Columns whose values are never returned to callers.
    pub fn password_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().filter(|c| c.is_password()).map(|c| c.name.as_str())
    }

    pub fn primary_column(&self) -> Option<&ColumnAttribute> {
        self.column(&self.primary_key)
    }

    /// Bind casts for every column with a non-text type.
    pub fn casts(&self) -> Casts {
        self.columns
            .iter()
            .filter_map(|c| c.field_type.sql_cast().map(|t| (c.name.clone(), t.to_string())))
            .collect()
    }

    pub fn join(&self, name: &str) -> Option<&JoinSpec> {
        self.config.joins.iter().find(|j| j.name == name)
    }
}

/// Per-table schema cache in front of a [`MetadataRepository`]. Tables are loaded on
/// first use; `invalidate` / `clear` force a reload after catalog edits.
#[derive(Clone)]
pub struct SchemaRegistry {
    repository: Arc<dyn MetadataRepository>,
    by_table: Arc<RwLock<HashMap<String, Arc<TableSchema>>>>,
}

impl SchemaRegistry {
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        SchemaRegistry {
            repository,
            by_table: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn cached(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.by_table
            .read()
            .ok()
            .and_then(|m| m.get(table).cloned())
    }

    /// Schema for `table`. Unknown tables are a bad request: only tables with
    /// declared metadata are reachable.
    pub async fn table(&self, table: &str) -> Result<Arc<TableSchema>, AppError> {
        if let Some(schema) = self.cached(table) {
            return Ok(schema);
        }
        let schema = self
            .repository
            .load_table(table)
            .await?
            .ok_or_else(|| AppError::BadRequest(format!("unknown target table: {}", table)))?;
        let schema = Arc::new(schema);
        tracing::debug!(table = %table, columns = schema.columns.len(), rules = schema.rules.len(), "metadata loaded");
        if let Ok(mut m) = self.by_table.write() {
            m.insert(table.to_string(), schema.clone());
        }
        Ok(schema)
    }

    pub fn invalidate(&self, table: &str) {
        if let Ok(mut m) = self.by_table.write() {
            m.remove(table);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut m) = self.by_table.write() {
            m.clear();
        }
    }
}
