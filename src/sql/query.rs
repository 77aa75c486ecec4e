//! Logical statements handed to a relational store. Identifiers come from metadata
//! only; values travel separately from the statement shape.

use crate::metadata::JoinSpec;
use crate::sql::Filter;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type Record = Map<String, Value>;

/// Column name -> SQL type used to cast bound values (`"bigint"`, `"timestamp"`, ...).
pub type Casts = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: &str) -> Self {
        SortKey {
            column: column.to_string(),
            descending: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        SortKey {
            column: column.to_string(),
            descending: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SelectQuery {
    pub table: String,
    /// Selected columns; empty selects every column of the main table.
    pub columns: Vec<String>,
    pub joins: Vec<JoinSpec>,
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub group_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub casts: Casts,
}

impl SelectQuery {
    pub fn new(table: &str) -> Self {
        SelectQuery {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn casts(mut self, casts: Casts) -> Self {
        self.casts = casts;
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

/// One or more rows sharing the same column set.
#[derive(Clone, Debug)]
pub struct InsertStatement {
    pub table: String,
    /// Primary key column; generated by the store when a row leaves it out.
    pub key_column: String,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub casts: Casts,
}

#[derive(Clone, Debug)]
pub struct UpdateStatement {
    pub table: String,
    pub values: Record,
    pub key_column: String,
    pub key: Value,
    pub casts: Casts,
}

#[derive(Clone, Debug)]
pub struct DeleteStatement {
    pub table: String,
    pub key_column: String,
    pub key: Value,
    pub casts: Casts,
}
