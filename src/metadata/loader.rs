//! Load metadata from in-memory values or from the catalog tables in the database.

use crate::error::{AppError, MetadataError};
use crate::metadata::{resolve_table, ColumnAttribute, TableConfig, TableSchema, ValidationRule};
use async_trait::async_trait;
use sqlx::PgPool;

pub const COLUMN_CATALOG: &str = "column_attribute";
pub const RULE_CATALOG: &str = "column_check_property";
pub const TABLE_CATALOG: &str = "table_attribute";

/// Source of per-table metadata.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Column descriptors, rules and table defaults for `table`; `None` when the
    /// table has no declared columns.
    async fn load_table(&self, table: &str) -> Result<Option<TableSchema>, AppError>;
}

/// In-memory catalog, filled from Rust values.
#[derive(Clone, Debug, Default)]
pub struct StaticMetadata {
    pub columns: Vec<ColumnAttribute>,
    pub rules: Vec<ValidationRule>,
    pub tables: Vec<TableConfig>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, attr: ColumnAttribute) -> Self {
        self.columns.push(attr);
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn table(mut self, config: TableConfig) -> Self {
        self.tables.push(config);
        self
    }
}

#[async_trait]
impl MetadataRepository for StaticMetadata {
    async fn load_table(&self, table: &str) -> Result<Option<TableSchema>, AppError> {
        let columns = self
            .columns
            .iter()
            .filter(|c| c.db_table_name == table)
            .cloned()
            .collect();
        let rules = self
            .rules
            .iter()
            .filter(|r| r.check_table == table)
            .cloned()
            .collect();
        let config = self.tables.iter().find(|t| t.dbtable == table).cloned();
        Ok(resolve_table(table, columns, rules, config, None)?)
    }
}

/// Reads the three catalog tables with bound parameters.
#[derive(Clone)]
pub struct PgMetadataRepository {
    pool: PgPool,
}

impl PgMetadataRepository {
    pub fn new(pool: PgPool) -> Self {
        PgMetadataRepository { pool }
    }

    async fn load_rows<T>(&self, catalog: &str, key_column: &str, table: &str) -> Result<Vec<T>, MetadataError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let sql = format!(
            "SELECT row_to_json(c) FROM {} c WHERE c.{} = $1",
            catalog, key_column
        );
        tracing::debug!(sql = %sql, table = %table, "query");
        let rows = sqlx::query_scalar::<_, serde_json::Value>(&sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MetadataError::Load(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let value: T = serde_json::from_value(row)
                .map_err(|e| MetadataError::Load(format!("{}: {}", catalog, e)))?;
            out.push(value);
        }
        Ok(out)
    }

    /// Primary key column according to the database catalog.
    async fn catalog_primary_key(&self, table: &str) -> Result<Option<String>, MetadataError> {
        let sql = r#"
            SELECT kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = $1
            ORDER BY kcu.ordinal_position
            LIMIT 1
        "#;
        sqlx::query_scalar::<_, String>(sql)
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MetadataError::Load(e.to_string()))
    }
}

#[async_trait]
impl MetadataRepository for PgMetadataRepository {
    async fn load_table(&self, table: &str) -> Result<Option<TableSchema>, AppError> {
        let columns: Vec<ColumnAttribute> = self.load_rows(COLUMN_CATALOG, "db_table_name", table).await?;
        if columns.is_empty() {
            return Ok(None);
        }
        let rules: Vec<ValidationRule> = self.load_rows(RULE_CATALOG, "check_table", table).await?;
        let config: Option<TableConfig> = self
            .load_rows::<TableConfig>(TABLE_CATALOG, "dbtable", table)
            .await?
            .into_iter()
            .next();
        let fallback_pk = if columns.iter().any(|c| c.is_pri) {
            None
        } else {
            self.catalog_primary_key(table).await?
        };
        Ok(resolve_table(table, columns, rules, config, fallback_pk)?)
    }
}
