//! Per-field validation from column attributes. Violations are collected, never thrown.

use crate::metadata::{ColumnAttribute, FieldType};
use crate::service::payload::{is_blank, Payload};
use crate::sql::value_text;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Required,
    Type,
    Length,
    Format,
    Range,
    Choice,
    NotFound,
    Duplicate,
    FieldsMustDiffer,
    RuleFailure,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Violation {
    pub field: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(field: &str, kind: ViolationKind, message: impl Into<String>) -> Self {
        Violation {
            field: field.to_string(),
            kind,
            message: message.into(),
        }
    }
}

/// Ordered violations; empty means the data passed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, v: Violation) {
        self.violations.push(v);
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.violations.extend(other.violations);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    pub fn messages(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.message.as_str()).collect()
    }

    pub fn joined(&self) -> String {
        self.messages().join("; ")
    }

    /// Prefix every message, e.g. with the item position of a batch.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        for v in &mut self.violations {
            v.message = format!("{}{}", prefix, v.message);
        }
        self
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^[A-Za-z0-9+_.-]+@(.+)$")
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^\+?[0-9]{10,15}$")
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^(http|https)://.*$")
}

fn file_extension_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^[^.]+\.[^.]+$")
}

pub fn is_datetime(s: &str) -> bool {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_integer(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

/// `"lo,hi"` -> `(lo, hi)`.
pub fn parse_bounds(params: Option<&str>) -> Option<(f64, f64)> {
    let (lo, hi) = params?.split_once(',')?;
    Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?))
}

pub struct FieldValidator;

impl FieldValidator {
    /// Every attribute is checked; required attributes must be present and non-blank.
    pub fn validate(attributes: &[&ColumnAttribute], data: &Payload) -> ValidationResult {
        let mut result = ValidationResult::new();
        for attr in attributes {
            let value = data.get(&attr.name);
            if is_blank(value) {
                if attr.is_required {
                    result.push(Violation::new(
                        &attr.name,
                        ViolationKind::Required,
                        format!("{} is required", label(attr)),
                    ));
                }
                continue;
            }
            if let Some(v) = value.and_then(|v| check_value(attr, v)) {
                result.push(v);
            }
        }
        result
    }

    /// Only attributes present in `data` are checked; a blank required value still fails.
    pub fn validate_partial(attributes: &[&ColumnAttribute], data: &Payload) -> ValidationResult {
        let present: Vec<&ColumnAttribute> = attributes
            .iter()
            .copied()
            .filter(|a| data.contains_key(&a.name))
            .collect();
        Self::validate(&present, data)
    }
}

fn label(attr: &ColumnAttribute) -> &str {
    attr.page_name
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(&attr.name)
}

/// First mismatch for one non-blank value.
fn check_value(attr: &ColumnAttribute, v: &Value) -> Option<Violation> {
    let name = label(attr);
    let fail = |kind, message: String| Some(Violation::new(&attr.name, kind, message));
    let text = value_text(v).unwrap_or_default();
    match &attr.field_type {
        FieldType::Date | FieldType::Datetime => {
            if !is_datetime(&text) {
                return fail(ViolationKind::Type, format!("{} must be a valid date", name));
            }
        }
        t if t.is_integer() => {
            if !is_integer(v) {
                return fail(ViolationKind::Type, format!("{} must be an integer", name));
            }
        }
        FieldType::Decimal | FieldType::Double => {
            if as_f64(v).is_none() {
                return fail(ViolationKind::Type, format!("{} must be a number", name));
            }
        }
        FieldType::Varchar => {
            if let Some(max) = attr.len {
                if text.chars().count() > max as usize {
                    return fail(
                        ViolationKind::Length,
                        format!("{} must be at most {} characters", name, max),
                    );
                }
            }
        }
        FieldType::Email if !email_re().is_match(&text) => {
            return fail(ViolationKind::Format, format!("{} must be a valid email", name));
        }
        FieldType::Phone if !phone_re().is_match(&text) => {
            return fail(ViolationKind::Format, format!("{} must be a valid phone number", name));
        }
        FieldType::Url if !url_re().is_match(&text) => {
            return fail(ViolationKind::Format, format!("{} must be a valid url", name));
        }
        FieldType::FileExtension if !file_extension_re().is_match(&text) => {
            return fail(ViolationKind::Format, format!("{} must be a file name with an extension", name));
        }
        FieldType::Range => {
            let Some(n) = as_f64(v) else {
                return fail(ViolationKind::Type, format!("{} must be a number", name));
            };
            if let Some((lo, hi)) = parse_bounds(attr.params.as_deref()) {
                if n < lo || n > hi {
                    return fail(
                        ViolationKind::Range,
                        format!("{} must be between {} and {}", name, lo, hi),
                    );
                }
            }
        }
        _ => {}
    }
    if attr.is_choice() {
        let options = attr.option_values();
        if !options.is_empty() && !options.iter().any(|o| *o == text.trim()) {
            return fail(
                ViolationKind::Choice,
                format!("{} must be one of: {}", name, options.join(", ")),
            );
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(attrs: &[ColumnAttribute], data: Value) -> ValidationResult {
        let refs: Vec<&ColumnAttribute> = attrs.iter().collect();
        FieldValidator::validate(&refs, data.as_object().unwrap())
    }

    #[test]
    fn varchar_length_counts_characters() {
        let attrs = [ColumnAttribute::new("t", "code", FieldType::Varchar).with_len(5)];
        assert_eq!(validate(&attrs, json!({"code": "abcdef"})).len(), 1);
        assert!(validate(&attrs, json!({"code": "abcde"})).is_empty());
        assert!(validate(&attrs, json!({"code": "ééééé"})).is_empty());
    }

    #[test]
    fn required_missing_skips_other_checks() {
        let attrs = [ColumnAttribute::new("t", "age", FieldType::Int).required()];
        let r = validate(&attrs, json!({"age": " "}));
        assert_eq!(r.len(), 1);
        assert_eq!(r.violations[0].kind, ViolationKind::Required);
    }

    #[test]
    fn every_field_checked_independently() {
        let attrs = [
            ColumnAttribute::new("t", "age", FieldType::Int),
            ColumnAttribute::new("t", "mail", FieldType::Email),
            ColumnAttribute::new("t", "born", FieldType::Date),
            ColumnAttribute::new("t", "site", FieldType::Url),
            ColumnAttribute::new("t", "phone", FieldType::Phone),
            ColumnAttribute::new("t", "file", FieldType::FileExtension),
            ColumnAttribute::new("t", "price", FieldType::Decimal),
        ];
        let r = validate(
            &attrs,
            json!({
                "age": "1.5",
                "mail": "nope",
                "born": "31/12/2020",
                "site": "ftp://x",
                "phone": "12345",
                "file": "README",
                "price": "abc"
            }),
        );
        assert_eq!(r.len(), 7);
        let ok = validate(
            &attrs,
            json!({
                "age": 3,
                "mail": "a@b.c",
                "born": "2020-12-31 10:00:00",
                "site": "https://x",
                "phone": "+12345678901",
                "file": "a.txt",
                "price": "9.99"
            }),
        );
        assert!(ok.is_empty(), "{:?}", ok);
    }

    #[test]
    fn range_bound_from_attribute_params() {
        let attrs = [ColumnAttribute::new("t", "score", FieldType::Range).with_params("0,100")];
        assert!(validate(&attrs, json!({"score": 100})).is_empty());
        let r = validate(&attrs, json!({"score": "101"}));
        assert_eq!(r.violations[0].kind, ViolationKind::Range);
    }

    #[test]
    fn choice_widgets_check_option_values() {
        let attrs = [ColumnAttribute::new("t", "sex", FieldType::Int)
            .with_show_type("radio")
            .with_options("1:Male|2:Female")];
        assert!(validate(&attrs, json!({"sex": 2})).is_empty());
        assert_eq!(validate(&attrs, json!({"sex": 3})).violations[0].kind, ViolationKind::Choice);
    }

    #[test]
    fn partial_ignores_absent_fields() {
        let attrs = [
            ColumnAttribute::new("t", "name", FieldType::Varchar).required(),
            ColumnAttribute::new("t", "age", FieldType::Int).required(),
        ];
        let refs: Vec<&ColumnAttribute> = attrs.iter().collect();
        let data = json!({"age": 3});
        assert!(FieldValidator::validate_partial(&refs, data.as_object().unwrap()).is_empty());
        let data = json!({"name": ""});
        assert_eq!(FieldValidator::validate_partial(&refs, data.as_object().unwrap()).len(), 1);
    }
}
