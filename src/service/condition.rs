//! Payload -> filter over searchable columns. Only declared columns appear and every
//! value is bound; the payload never contributes SQL text.

use crate::metadata::{ColumnAttribute, FieldType, QueryType};
use crate::service::payload::{coerce, is_blank, Payload};
use crate::sql::{value_text, Filter, Operator, Predicate};
use serde_json::Value;

pub struct ConditionBuilder;

impl ConditionBuilder {
    /// One predicate per searchable attribute with a non-blank value, ANDed in attribute
    /// order. Detail mode matches every attribute exactly.
    pub fn build(table: &str, params: &Payload, attributes: &[&ColumnAttribute], detail: bool) -> Filter {
        let mut filter = Filter::new();
        for attr in attributes.iter().filter(|a| a.search_flag) {
            let Some(value) = params.get(&attr.name) else {
                continue;
            };
            if is_blank(Some(value)) {
                continue;
            }
            let column = format!("{}.{}", table, attr.name);
            let style = if detail { QueryType::Exact } else { attr.query_style() };
            for op in operators(attr, style, value) {
                filter.push(Predicate::new(&column, op));
            }
        }
        tracing::debug!(table = %table, predicates = filter.predicates.len(), detail, "condition built");
        filter
    }
}

fn operators(attr: &ColumnAttribute, style: QueryType, value: &Value) -> Vec<Operator> {
    let ft = &attr.field_type;
    match style {
        QueryType::Exact => exact(ft, value).into_iter().collect(),
        QueryType::Contains => text(value).map(Operator::Contains).into_iter().collect(),
        QueryType::Prefix => text(value).map(Operator::StartsWith).into_iter().collect(),
        QueryType::Range => range(ft, value),
    }
}

fn text(value: &Value) -> Option<String> {
    value_text(value).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn exact(ft: &FieldType, value: &Value) -> Option<Operator> {
    coerce(ft, value).filter(|v| !v.is_null()).map(Operator::Eq)
}

/// Bounds from `[lo, hi]` or `"lo,hi"`; a blank side leaves that side open. A single
/// value without a separator matches exactly.
fn range(ft: &FieldType, value: &Value) -> Vec<Operator> {
    let (lo, hi) = match value {
        Value::Array(items) if items.len() == 2 => (items[0].clone(), items[1].clone()),
        Value::String(s) if s.contains(',') => {
            let (a, b) = s.split_once(',').unwrap_or((s.as_str(), ""));
            (Value::String(a.trim().to_string()), Value::String(b.trim().to_string()))
        }
        Value::Array(_) => return Vec::new(),
        other => return exact(ft, other).into_iter().collect(),
    };
    let lo = bound(ft, &lo);
    let hi = bound(ft, &hi);
    match (lo, hi) {
        (Some(lo), Some(hi)) => vec![Operator::Between(lo, hi)],
        (Some(lo), None) => vec![Operator::Ge(lo)],
        (None, Some(hi)) => vec![Operator::Le(hi)],
        (None, None) => Vec::new(),
    }
}

fn bound(ft: &FieldType, v: &Value) -> Option<Value> {
    if is_blank(Some(v)) {
        return None;
    }
    coerce(ft, v).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnAttribute;
    use serde_json::json;

    fn attrs() -> Vec<ColumnAttribute> {
        vec![
            ColumnAttribute::new("t", "name", FieldType::Varchar).searchable(),
            ColumnAttribute::new("t", "age", FieldType::Int).searchable(),
            ColumnAttribute::new("t", "create_time", FieldType::Datetime).searchable(),
            ColumnAttribute::new("t", "code", FieldType::Varchar)
                .searchable()
                .with_query_type(QueryType::Prefix),
            ColumnAttribute::new("t", "secret", FieldType::Varchar),
        ]
    }

    fn build(params: Value, detail: bool) -> Filter {
        let attrs = attrs();
        let refs: Vec<&ColumnAttribute> = attrs.iter().collect();
        ConditionBuilder::build("t", params.as_object().unwrap(), &refs, detail)
    }

    #[test]
    fn styles_follow_field_types() {
        let f = build(
            json!({
                "name": "ali",
                "age": "30",
                "create_time": "2024-01-01,",
                "code": "A1",
                "secret": "x",
                "unknown": "y"
            }),
            false,
        );
        assert_eq!(
            f.predicates,
            vec![
                Predicate::new("t.name", Operator::Contains("ali".into())),
                Predicate::new("t.age", Operator::Eq(json!(30))),
                Predicate::new("t.create_time", Operator::Ge(json!("2024-01-01"))),
                Predicate::new("t.code", Operator::StartsWith("A1".into())),
            ]
        );
    }

    #[test]
    fn detail_mode_is_exact() {
        let f = build(json!({"name": "ali"}), true);
        assert_eq!(f.predicates, vec![Predicate::eq("t.name", json!("ali"))]);
    }

    #[test]
    fn blank_and_unparseable_values_are_ignored() {
        let f = build(json!({"name": "  ", "age": "thirty"}), false);
        assert!(f.is_empty());
    }

    #[test]
    fn array_range() {
        let f = build(json!({"create_time": ["2024-01-01", "2024-12-31"]}), false);
        assert_eq!(
            f.predicates,
            vec![Predicate::new(
                "t.create_time",
                Operator::Between(json!("2024-01-01"), json!("2024-12-31"))
            )]
        );
    }

    #[test]
    fn deterministic() {
        let p = json!({"name": "a", "age": 1});
        assert_eq!(build(p.clone(), false), build(p, false));
    }
}
