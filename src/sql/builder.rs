//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE for PostgreSQL.

use crate::sql::{Casts, DeleteStatement, Filter, InsertStatement, Operator, SelectQuery, UpdateStatement};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from metadata).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `"table"."column"`, or the given qualification when the column is already `t.c`.
fn column_ref(table: &str, column: &str) -> String {
    match column.split_once('.') {
        Some((t, c)) => format!("{}.{}", quoted(t), quoted(c)),
        None => format!("{}.{}", quoted(table), quoted(column)),
    }
}

fn bare_column(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

/// Escape LIKE metacharacters; used with `ESCAPE '\'`.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder, cast when the column has a declared type.
    fn placeholder(&mut self, v: Value, cast: Option<&String>) -> String {
        let n = self.push_param(v);
        match cast {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }
}

fn render_filter(table: &str, filter: &Filter, casts: &Casts, q: &mut QueryBuf) -> String {
    if filter.is_empty() {
        return String::new();
    }
    let mut parts = Vec::with_capacity(filter.predicates.len());
    for p in &filter.predicates {
        let col = column_ref(table, &p.column);
        let cast = casts.get(bare_column(&p.column));
        let part = match &p.op {
            Operator::Eq(v) => format!("{} = {}", col, q.placeholder(v.clone(), cast)),
            Operator::Ne(v) => format!("{} <> {}", col, q.placeholder(v.clone(), cast)),
            Operator::Gt(v) => format!("{} > {}", col, q.placeholder(v.clone(), cast)),
            Operator::Ge(v) => format!("{} >= {}", col, q.placeholder(v.clone(), cast)),
            Operator::Lt(v) => format!("{} < {}", col, q.placeholder(v.clone(), cast)),
            Operator::Le(v) => format!("{} <= {}", col, q.placeholder(v.clone(), cast)),
            Operator::Contains(s) => {
                let n = q.push_param(Value::String(format!("%{}%", escape_like(s))));
                format!("{}::text LIKE ${} ESCAPE '\\'", col, n)
            }
            Operator::StartsWith(s) => {
                let n = q.push_param(Value::String(format!("{}%", escape_like(s))));
                format!("{}::text LIKE ${} ESCAPE '\\'", col, n)
            }
            Operator::Between(lo, hi) => {
                let lo = q.placeholder(lo.clone(), cast);
                let hi = q.placeholder(hi.clone(), cast);
                format!("{} BETWEEN {} AND {}", col, lo, hi)
            }
        };
        parts.push(part);
    }
    format!(" WHERE {}", parts.join(" AND "))
}

fn render_joins(query: &SelectQuery) -> String {
    query
        .joins
        .iter()
        .map(|j| {
            format!(
                " LEFT JOIN {} ON {} = {}",
                quoted(&j.table),
                column_ref(&query.table, &j.column),
                column_ref(&j.table, &j.ref_column)
            )
        })
        .collect()
}

fn render_group_by(query: &SelectQuery) -> String {
    if query.group_by.is_empty() {
        return String::new();
    }
    let cols: Vec<String> = query.group_by.iter().map(|c| column_ref(&query.table, c)).collect();
    format!(" GROUP BY {}", cols.join(", "))
}

fn select_column_list(query: &SelectQuery) -> String {
    if !query.columns.is_empty() {
        return query
            .columns
            .iter()
            .map(|c| column_ref(&query.table, c))
            .collect::<Vec<_>>()
            .join(", ");
    }
    if !query.group_by.is_empty() {
        let mut cols: Vec<String> = query.group_by.iter().map(|c| column_ref(&query.table, c)).collect();
        cols.push(format!("COUNT(*) AS {}", quoted("total")));
        return cols.join(", ");
    }
    format!("{}.*", quoted(&query.table))
}

/// SELECT with joins, filter, grouping, ORDER BY and LIMIT/OFFSET.
pub fn select(query: &SelectQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = select_column_list(query);
    let joins = render_joins(query);
    let where_clause = render_filter(&query.table, &query.filter, &query.casts, &mut q);
    let group_clause = render_group_by(query);
    let order_clause = if query.sort.is_empty() {
        String::new()
    } else {
        let keys: Vec<String> = query
            .sort
            .iter()
            .map(|k| format!("{} {}", column_ref(&query.table, &k.column), if k.descending { "DESC" } else { "ASC" }))
            .collect();
        format!(" ORDER BY {}", keys.join(", "))
    };
    let limit_clause = query.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = query.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}{}{}",
        cols,
        quoted(&query.table),
        joins,
        where_clause,
        group_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// COUNT(*) over the same joins and filter; grouped queries count groups.
pub fn count(query: &SelectQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let joins = render_joins(query);
    let where_clause = render_filter(&query.table, &query.filter, &query.casts, &mut q);
    q.sql = if query.group_by.is_empty() {
        format!("SELECT COUNT(*) FROM {}{}{}", quoted(&query.table), joins, where_clause)
    } else {
        format!(
            "SELECT COUNT(*) FROM (SELECT 1 FROM {}{}{}{}) grouped",
            quoted(&query.table),
            joins,
            where_clause,
            render_group_by(query)
        )
    };
    q
}

/// INSERT of one or more rows; missing values in a row bind as NULL.
pub fn insert(stmt: &InsertStatement) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols: Vec<String> = stmt.columns.iter().map(|c| quoted(c)).collect();
    let mut tuples = Vec::with_capacity(stmt.rows.len());
    for row in &stmt.rows {
        let placeholders: Vec<String> = stmt
            .columns
            .iter()
            .map(|c| {
                let v = row.get(c).cloned().unwrap_or(Value::Null);
                q.placeholder(v, stmt.casts.get(c))
            })
            .collect();
        tuples.push(format!("({})", placeholders.join(", ")));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quoted(&stmt.table),
        cols.join(", "),
        tuples.join(", ")
    );
    q
}

/// UPDATE by key: SET every value except the key column.
pub fn update(stmt: &UpdateStatement) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (k, v) in &stmt.values {
        if *k == stmt.key_column {
            continue;
        }
        let rhs = q.placeholder(v.clone(), stmt.casts.get(k));
        sets.push(format!("{} = {}", quoted(k), rhs));
    }
    let key = q.placeholder(stmt.key.clone(), stmt.casts.get(&stmt.key_column));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quoted(&stmt.table),
        sets.join(", "),
        quoted(&stmt.key_column),
        key
    );
    q
}

/// DELETE by key.
pub fn delete(stmt: &DeleteStatement) -> QueryBuf {
    let mut q = QueryBuf::new();
    let key = q.placeholder(stmt.key.clone(), stmt.casts.get(&stmt.key_column));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        quoted(&stmt.table),
        quoted(&stmt.key_column),
        key
    );
    q
}
