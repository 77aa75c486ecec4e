//! Metadata validation: identifier safety, unique column names, single primary key.

use crate::error::MetadataError;
use crate::metadata::{ColumnAttribute, TableConfig, TableSchema, ValidationRule};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"))
}

/// True for a bare SQL identifier (`user_name`, `T1`).
pub fn is_identifier(s: &str) -> bool {
    identifier_re().is_match(s)
}

/// True for `column` or `table.column`.
pub fn is_qualified_identifier(s: &str) -> bool {
    match s.split_once('.') {
        Some((t, c)) => is_identifier(t) && is_identifier(c),
        None => is_identifier(s),
    }
}

pub fn ensure_identifier(s: &str) -> Result<(), MetadataError> {
    if is_identifier(s) {
        Ok(())
    } else {
        Err(MetadataError::InvalidIdentifier(s.to_string()))
    }
}

/// Build a [`TableSchema`] from catalog rows. `fallback_pk` is used when no
/// attribute is flagged primary (e.g. the key found in the database catalog).
/// Returns `Ok(None)` when the table declares no columns.
pub fn resolve_table(
    table: &str,
    mut columns: Vec<ColumnAttribute>,
    mut rules: Vec<ValidationRule>,
    config: Option<TableConfig>,
    fallback_pk: Option<String>,
) -> Result<Option<TableSchema>, MetadataError> {
    ensure_identifier(table)?;
    if columns.is_empty() {
        return Ok(None);
    }

    let mut seen = HashSet::new();
    for c in &columns {
        ensure_identifier(&c.name)?;
        if !seen.insert(c.name.as_str()) {
            return Err(MetadataError::DuplicateColumn {
                table: table.to_string(),
                column: c.name.clone(),
            });
        }
    }

    let pks: Vec<&str> = columns.iter().filter(|c| c.is_pri).map(|c| c.name.as_str()).collect();
    let primary_key = match pks.as_slice() {
        [pk] => pk.to_string(),
        [] => fallback_pk
            .filter(|pk| seen.contains(pk.as_str()))
            .ok_or_else(|| MetadataError::MissingPrimaryKey { table: table.to_string() })?,
        _ => return Err(MetadataError::CompositePrimaryKey { table: table.to_string() }),
    };

    let config = config.unwrap_or_else(|| TableConfig {
        dbtable: table.to_string(),
        ..Default::default()
    });
    for j in &config.joins {
        ensure_identifier(&j.table)?;
        ensure_identifier(&j.column)?;
        ensure_identifier(&j.ref_column)?;
    }
    for r in &rules {
        if let Some(t) = &r.target_table {
            ensure_identifier(t)?;
        }
    }

    columns.sort_by(|a, b| a.order_no.cmp(&b.order_no).then_with(|| a.name.cmp(&b.name)));
    rules.sort_by_key(|r| r.order_no);

    Ok(Some(TableSchema {
        table: table.to_string(),
        columns,
        rules,
        config,
        primary_key,
    }))
}
