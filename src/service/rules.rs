//! Cross-record business rules evaluated against the store before a write.
//!
//! Existence checks parse their where template into bound predicates; the template is
//! never spliced into SQL. Each rule runs in isolation under a timeout.

use crate::error::AppError;
use crate::metadata::{is_identifier, CheckMode, FieldType, TableSchema, ValidationRule};
use crate::service::dao::BaseDao;
use crate::service::payload::{coerce, is_blank, split_list, Payload};
use crate::service::validation::{parse_bounds, ValidationResult, Violation, ViolationKind};
use crate::sql::{value_text, Casts, Filter, Operator, Predicate, SelectQuery};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

/// Bound used by `isRange` rules without their own `"lo,hi"` params.
pub const LEGACY_RANGE: (f64, f64) = (18.0, 60.0);

#[derive(Clone, Debug, PartialEq)]
enum Operand {
    /// `%s` or `:value`: the submitted value.
    Value,
    Literal(Value),
}

#[derive(Clone, Debug, PartialEq)]
struct Term {
    column: String,
    op: String,
    operand: Operand,
}

fn tokenize(template: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' {
            chars.next();
            let mut s = String::from("'");
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        s.push('\'');
                    }
                    Some('\'') => break,
                    Some(ch) => s.push(ch),
                    None => return Err("unterminated string literal".into()),
                }
            }
            tokens.push(s);
        } else if matches!(c, '=' | '!' | '<' | '>') {
            let mut op = String::new();
            while let Some(&ch) = chars.peek() {
                if matches!(ch, '=' | '!' | '<' | '>') {
                    op.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(op);
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || matches!(ch, '=' | '!' | '<' | '>' | '\'') {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(word);
        }
    }
    Ok(tokens)
}

/// `term (AND term)*` with `term := column op operand`.
fn parse_template(template: &str) -> Result<Vec<Term>, String> {
    let tokens = tokenize(template)?;
    let mut terms = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if !terms.is_empty() {
            if !tokens[i].eq_ignore_ascii_case("AND") {
                return Err(format!("expected AND, found '{}'", tokens[i]));
            }
            i += 1;
        }
        let (Some(column), Some(op), Some(operand)) = (tokens.get(i), tokens.get(i + 1), tokens.get(i + 2)) else {
            return Err("incomplete condition".into());
        };
        if !is_identifier(column) {
            return Err(format!("invalid column '{}'", column));
        }
        let op = op.to_uppercase();
        if !matches!(op.as_str(), "=" | "!=" | "<>" | ">" | ">=" | "<" | "<=" | "LIKE") {
            return Err(format!("unsupported operator '{}'", op));
        }
        let operand = if operand == "%s" || operand == ":value" {
            Operand::Value
        } else if let Some(s) = operand.strip_prefix('\'') {
            Operand::Literal(Value::String(s.to_string()))
        } else if let Ok(n) = operand.parse::<i64>() {
            Operand::Literal(Value::from(n))
        } else if let Some(n) = operand.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            Operand::Literal(Value::Number(n))
        } else {
            return Err(format!("invalid operand '{}'", operand));
        };
        terms.push(Term {
            column: column.clone(),
            op,
            operand,
        });
        i += 3;
    }
    if terms.is_empty() {
        return Err("empty condition".into());
    }
    Ok(terms)
}

fn like_operator(pattern: &str) -> Operator {
    let inner = pattern.trim_start_matches('%');
    let leading = inner.len() != pattern.len();
    let core = inner.trim_end_matches('%');
    let trailing = core.len() != inner.len();
    match (leading, trailing) {
        (true, _) => Operator::Contains(core.to_string()),
        (false, true) => Operator::StartsWith(core.to_string()),
        (false, false) => Operator::Eq(Value::String(pattern.to_string())),
    }
}

fn term_predicate(term: &Term, value: &Value) -> Predicate {
    let operand = match &term.operand {
        Operand::Value => value.clone(),
        Operand::Literal(v) => v.clone(),
    };
    let op = match term.op.as_str() {
        "=" => Operator::Eq(operand),
        "!=" | "<>" => Operator::Ne(operand),
        ">" => Operator::Gt(operand),
        ">=" => Operator::Ge(operand),
        "<" => Operator::Lt(operand),
        "<=" => Operator::Le(operand),
        _ => match &term.operand {
            Operand::Value => Operator::Contains(value_text(&operand).unwrap_or_default()),
            Operand::Literal(v) => like_operator(&value_text(v).unwrap_or_default()),
        },
    };
    Predicate::new(&term.column, op)
}

/// Existence filter for `rule` with the submitted `value`; blank template means `column = %s`.
fn existence_filter(rule: &ValidationRule, value: &Value) -> Result<Filter, String> {
    let template = match rule.where_str.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => format!("{} = %s", rule.check_column.trim()),
    };
    let terms = parse_template(&template)?;
    Ok(Filter {
        predicates: terms.iter().map(|t| term_predicate(t, value)).collect(),
    })
}

fn rule_label(rule: &ValidationRule) -> String {
    format!("{}.{}({})", rule.check_table, rule.check_mode.as_str(), rule.check_column)
}

fn message(rule: &ValidationRule, default: &str) -> String {
    let m = rule.message().trim();
    if m.is_empty() {
        format!("{}: {}", rule.check_column, default)
    } else {
        m.to_string()
    }
}

pub struct RuleValidator;

impl RuleValidator {
    /// Evaluates every rule of `schema` against `data`. A rule that errors or times out
    /// adds one `rule evaluation failed` line and the remaining rules still run.
    /// `current_key` is the row being updated; it never counts as its own duplicate.
    pub async fn validate(
        dao: &mut BaseDao<'_>,
        schema: &TableSchema,
        data: &Payload,
        current_key: Option<&Value>,
        timeout: Duration,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        for rule in &schema.rules {
            let outcome = tokio::time::timeout(timeout, evaluate(dao, schema, rule, data, current_key)).await;
            let failure = match outcome {
                Ok(Ok(Some(v))) => {
                    tracing::warn!(rule = %rule_label(rule), message = %v.message, "rule violated");
                    result.push(v);
                    continue;
                }
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {} ms", timeout.as_millis()),
            };
            tracing::error!(rule = %rule_label(rule), error = %failure, "rule evaluation failed");
            result.push(Violation::new(
                &rule.check_column,
                ViolationKind::RuleFailure,
                format!("rule evaluation failed [{}]", rule_label(rule)),
            ));
        }
        result
    }
}

async fn evaluate(
    dao: &mut BaseDao<'_>,
    schema: &TableSchema,
    rule: &ValidationRule,
    data: &Payload,
    current_key: Option<&Value>,
) -> Result<Option<Violation>, AppError> {
    match &rule.check_mode {
        CheckMode::IsExist | CheckMode::IsNotExist => {
            let column = rule.check_column.trim();
            let Some(raw) = data.get(column).filter(|v| !is_blank(Some(*v))) else {
                return Ok(None);
            };
            let field_type = schema
                .column(column)
                .map(|c| c.field_type.clone())
                .unwrap_or(FieldType::Varchar);
            let value = coerce(&field_type, raw).unwrap_or_else(|| raw.clone());
            let mut filter = existence_filter(rule, &value)
                .map_err(|e| AppError::BadRequest(format!("where template: {}", e)))?;
            let target = rule.target_table.as_deref().unwrap_or(&schema.table);
            let same_table = target == schema.table;
            if let (CheckMode::IsNotExist, true, Some(key)) = (&rule.check_mode, same_table, current_key) {
                filter.push(Predicate::new(&schema.primary_key, Operator::Ne(key.clone())));
            }
            let casts: Casts = if same_table { schema.casts() } else { Casts::new() };
            let n = dao.count(&SelectQuery::new(target).filter(filter).casts(casts)).await?;
            Ok(match rule.check_mode {
                CheckMode::IsExist if n == 0 => Some(Violation::new(
                    column,
                    ViolationKind::NotFound,
                    message(rule, "data not found"),
                )),
                CheckMode::IsNotExist if n > 0 => Some(Violation::new(
                    column,
                    ViolationKind::Duplicate,
                    message(rule, "duplicate data"),
                )),
                _ => None,
            })
        }
        CheckMode::MultiFieldRepeat => {
            let columns = split_list(&rule.check_column);
            let submitted: Vec<String> = columns
                .iter()
                .filter_map(|c| data.get(c))
                .filter(|v| !is_blank(Some(*v)))
                .filter_map(|v| value_text(v).map(|s| s.trim().to_string()))
                .collect();
            let distinct: HashSet<&String> = submitted.iter().collect();
            Ok((distinct.len() < submitted.len()).then(|| {
                Violation::new(
                    &rule.check_column,
                    ViolationKind::FieldsMustDiffer,
                    message(rule, "fields must differ"),
                )
            }))
        }
        CheckMode::IsRange => {
            let column = rule.check_column.trim();
            let Some(raw) = data.get(column).filter(|v| !is_blank(Some(*v))) else {
                return Ok(None);
            };
            let (lo, hi) = parse_bounds(rule.params.as_deref()).unwrap_or_else(|| {
                tracing::warn!(rule = %rule_label(rule), "isRange without params, using legacy bound 18,60");
                LEGACY_RANGE
            });
            let n = value_text(raw).and_then(|s| s.trim().parse::<f64>().ok());
            Ok(match n {
                Some(n) if n >= lo && n <= hi => None,
                _ => Some(Violation::new(
                    column,
                    ViolationKind::Range,
                    message(rule, &format!("value must be between {} and {}", lo, hi)),
                )),
            })
        }
        CheckMode::Unknown(mode) => {
            tracing::warn!(rule = %rule_label(rule), mode = %mode, "unknown check mode skipped");
            Ok(None)
        }
    }
}
