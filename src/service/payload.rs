//! Request payload: control keys, blank detection and value coercion by field type.

use crate::error::AppError;
use crate::metadata::{is_identifier, ColumnAttribute, FieldType, TableSchema};
use crate::sql::value_text;
use serde_json::{Map, Number, Value};

/// Untyped key -> value map of one call.
pub type Payload = Map<String, Value>;

pub const TARGET_TABLE: &str = "targetTable";
pub const ID: &str = "id";
pub const PAGE_INDEX: &str = "pageIndex";
pub const PAGE_SIZE: &str = "pageSize";
pub const SORT: &str = "sortByAndType";
pub const GROUP_BY: &str = "groupByString";
pub const JOINS: &str = "joinString";
pub const COLUMNS: &str = "columns";
pub const ITEMS: &str = "items";

pub const CONTROL_KEYS: &[&str] = &[TARGET_TABLE, ID, PAGE_INDEX, PAGE_SIZE, SORT, GROUP_BY, JOINS, COLUMNS, ITEMS];

/// Missing, null, or whitespace-only string.
pub fn is_blank(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Trimmed, non-blank text of `payload[key]`.
pub fn str_param(payload: &Payload, key: &str) -> Option<String> {
    let v = payload.get(key)?;
    if is_blank(Some(v)) {
        return None;
    }
    value_text(v).map(|s| s.trim().to_string())
}

/// Integer parameter; blank is `None`, anything else unparseable is a bad request.
pub fn int_param(payload: &Payload, key: &str) -> Result<Option<i64>, AppError> {
    let Some(text) = str_param(payload, key) else {
        return Ok(None);
    };
    text.parse::<i64>()
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("{} must be an integer", key)))
}

pub fn target_table(payload: &Payload) -> Result<String, AppError> {
    let table = str_param(payload, TARGET_TABLE)
        .ok_or_else(|| AppError::BadRequest(format!("{} is required", TARGET_TABLE)))?;
    if !is_identifier(&table) {
        return Err(AppError::BadRequest(format!("invalid target table: {}", table)));
    }
    Ok(table)
}

fn parse_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_decimal(v: &Value) -> Option<Number> {
    match v {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(Number::from_f64),
        _ => None,
    }
}

/// Value converted to the representation bound for `field_type`. `None` when a
/// numeric type cannot be parsed.
pub fn coerce(field_type: &FieldType, v: &Value) -> Option<Value> {
    if v.is_null() {
        return Some(Value::Null);
    }
    if field_type.is_integer() {
        parse_int(v).map(Value::from)
    } else if field_type.is_decimal() {
        parse_decimal(v).map(Value::Number)
    } else if matches!(field_type, FieldType::Other(_)) {
        Some(v.clone())
    } else {
        value_text(v).map(Value::String)
    }
}

/// Value written for a column: blank non-text values become null.
pub fn coerce_for_write(attr: &ColumnAttribute, v: &Value) -> Value {
    if is_blank(Some(v)) && !attr.field_type.is_textual() {
        return Value::Null;
    }
    coerce(&attr.field_type, v).unwrap_or_else(|| v.clone())
}

/// Key of the row addressed by the call. Integer keys must be positive; `id` wins over
/// the primary-key column. Text keys are only taken from `id`, so a text key in the
/// payload on insert is the new row's key.
pub fn record_key(payload: &Payload, schema: &TableSchema) -> Option<Value> {
    let pk_type = schema
        .primary_column()
        .map(|c| c.field_type.clone())
        .unwrap_or(FieldType::BigInt);
    if pk_type.is_textual() {
        return str_param(payload, ID).map(Value::String);
    }
    [ID, schema.primary_key.as_str()]
        .iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| !is_blank(Some(*v)))
        .and_then(parse_int)
        .filter(|n| *n > 0)
        .map(Value::from)
}

/// Comma list, trimmed, blanks dropped.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
