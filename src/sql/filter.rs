//! Structured, value-bound filter: a conjunction of column predicates.
//! Rendered to SQL by the builder and evaluated directly by the in-memory store.

use serde_json::Value;
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Ge(Value),
    Lt(Value),
    Le(Value),
    /// Substring match (`LIKE %v%`).
    Contains(String),
    /// Prefix match (`LIKE v%`).
    StartsWith(String),
    /// Inclusive range.
    Between(Value, Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: Operator,
}

impl Predicate {
    pub fn new(column: &str, op: Operator) -> Self {
        Predicate {
            column: column.to_string(),
            op,
        }
    }

    pub fn eq(column: &str, value: Value) -> Self {
        Predicate::new(column, Operator::Eq(value))
    }

    pub fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        let name = self.column.rsplit('.').next().unwrap_or(&self.column);
        let actual = record.get(name).unwrap_or(&Value::Null);
        match &self.op {
            Operator::Eq(v) => compare_values(actual, v) == Some(Ordering::Equal),
            Operator::Ne(v) => matches!(compare_values(actual, v), Some(o) if o != Ordering::Equal),
            Operator::Gt(v) => compare_values(actual, v) == Some(Ordering::Greater),
            Operator::Ge(v) => matches!(compare_values(actual, v), Some(Ordering::Greater | Ordering::Equal)),
            Operator::Lt(v) => compare_values(actual, v) == Some(Ordering::Less),
            Operator::Le(v) => matches!(compare_values(actual, v), Some(Ordering::Less | Ordering::Equal)),
            Operator::Contains(needle) => value_text(actual).map(|s| s.contains(needle.as_str())).unwrap_or(false),
            Operator::StartsWith(prefix) => value_text(actual).map(|s| s.starts_with(prefix.as_str())).unwrap_or(false),
            Operator::Between(lo, hi) => {
                matches!(compare_values(actual, lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare_values(actual, hi), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

/// AND of predicates; empty means always true.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn and(mut self, p: Predicate) -> Self {
        self.predicates.push(p);
        self
    }

    pub fn push(&mut self, p: Predicate) {
        self.predicates.push(p);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

/// Text form of a scalar value; `None` for null. Arrays and objects yield their JSON text.
pub fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// SQL-like comparison: null compares to nothing; numbers compare numerically
/// (numeric strings included); everything else compares by text.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if a.is_number() || b.is_number() {
        if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
            return x.partial_cmp(&y);
        }
    }
    Some(value_text(a)?.cmp(&value_text(b)?))
}
