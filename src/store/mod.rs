//! Relational store boundary: transactional execution of logical statements,
//! plus database bootstrap (catalog and audit tables).

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppError;
use crate::metadata::{COLUMN_CATALOG, RULE_CATALOG, TABLE_CATALOG};
use crate::sql::{DeleteStatement, InsertStatement, Record, SelectQuery, UpdateStatement};
use async_trait::async_trait;
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;

/// Opens transactions. Every read and write of a use case goes through one [`StoreTx`].
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;
}

/// One open transaction. Dropping it without [`StoreTx::commit`] rolls back.
#[async_trait]
pub trait StoreTx: Send {
    async fn select(&mut self, query: &SelectQuery) -> Result<Vec<Record>, AppError>;

    /// Matching rows (or groups, when grouped), ignoring limit and offset.
    async fn count(&mut self, query: &SelectQuery) -> Result<u64, AppError>;

    /// Inserts every row of the statement; returns the stored rows including generated keys.
    async fn insert(&mut self, stmt: &InsertStatement) -> Result<Vec<Record>, AppError>;

    async fn update(&mut self, stmt: &UpdateStatement) -> Result<u64, AppError>;

    async fn delete(&mut self, stmt: &DeleteStatement) -> Result<u64, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

/// Creates the database named in `database_url` if it does not exist (connects to `postgres` first).
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Creates the three metadata catalogs if missing. Existing catalogs are left untouched.
pub async fn ensure_catalog_tables(pool: &PgPool) -> Result<(), AppError> {
    let columns_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            db_table_name TEXT NOT NULL,
            table_name TEXT,
            name TEXT NOT NULL,
            page_name TEXT,
            field_type TEXT,
            len INTEGER,
            is_required SMALLINT NOT NULL DEFAULT 0,
            edit_flag SMALLINT NOT NULL DEFAULT 1,
            search_flag SMALLINT NOT NULL DEFAULT 0,
            show_type TEXT,
            query_type TEXT,
            default_value TEXT,
            options TEXT,
            is_pri SMALLINT NOT NULL DEFAULT 0,
            is_foreign_key SMALLINT NOT NULL DEFAULT 0,
            roles TEXT,
            params TEXT,
            order_no INTEGER NOT NULL DEFAULT 0,
            UNIQUE (db_table_name, name)
        )
        "#,
        COLUMN_CATALOG
    );
    sqlx::query(&columns_ddl).execute(pool).await?;

    let rules_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            check_table TEXT NOT NULL,
            check_mode TEXT NOT NULL,
            check_column TEXT NOT NULL,
            target_table TEXT,
            where_str TEXT,
            error_msg TEXT,
            params TEXT,
            order_no INTEGER NOT NULL DEFAULT 0
        )
        "#,
        RULE_CATALOG
    );
    sqlx::query(&rules_ddl).execute(pool).await?;

    let tables_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            dbtable TEXT PRIMARY KEY,
            sort TEXT,
            groupby TEXT,
            joins JSONB NOT NULL DEFAULT '[]'::jsonb,
            defin_columns TEXT
        )
        "#,
        TABLE_CATALOG
    );
    sqlx::query(&tables_ddl).execute(pool).await?;
    tracing::debug!("catalog tables ready");
    Ok(())
}

/// Creates the request audit table if missing.
pub async fn ensure_audit_table(pool: &PgPool, table: &str) -> Result<(), AppError> {
    crate::metadata::ensure_identifier(table)?;
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            path TEXT NOT NULL,
            method TEXT NOT NULL,
            params TEXT,
            user_id BIGINT,
            duration BIGINT NOT NULL,
            status INTEGER NOT NULL,
            error_message TEXT,
            trace_id TEXT NOT NULL,
            create_time BIGINT NOT NULL
        )
        "#,
        quote_ident(table)
    );
    sqlx::query(&ddl).execute(pool).await?;
    Ok(())
}
