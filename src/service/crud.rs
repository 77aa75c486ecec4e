//! CrudService: list, detail, save, batch save, delete and login over any table with metadata.

use crate::auth::{hash_password, verify_password, Principal};
use crate::error::AppError;
use crate::metadata::{
    is_identifier, ColumnAttribute, FieldType, JoinSpec, TableSchema, CREATE_BY, CREATE_TIME, UPDATE_BY, UPDATE_TIME,
};
use crate::response::PageResult;
use crate::service::condition::ConditionBuilder;
use crate::service::dao::BaseDao;
use crate::service::payload::{
    coerce_for_write, int_param, is_blank, record_key, split_list, str_param, target_table, Payload, COLUMNS, GROUP_BY,
    ID, ITEMS, JOINS, PAGE_INDEX, PAGE_SIZE, SORT,
};
use crate::service::rules::RuleValidator;
use crate::service::validation::{FieldValidator, ValidationResult, ViolationKind};
use crate::sql::{value_text, Filter, Predicate, Record, SelectQuery, SortKey};
use crate::state::AppState;
use serde_json::Value;

pub const USERNAME_COLUMN: &str = "username";
pub const PASSWORD_COLUMN: &str = "password";
pub const LAST_LOGIN_COLUMN: &str = "last_login_time";
pub const ORG_COLUMN: &str = "org_id";
pub const ROLES_COLUMN: &str = "roles";

pub struct CrudService;

impl CrudService {
    /// One page of `targetTable` plus the total match count. Paging, sort, group-by, joins
    /// and the column list come from the payload or the table defaults.
    pub async fn get_list(state: &AppState, principal: &Principal, params: &Payload) -> Result<PageResult, AppError> {
        let table = target_table(params)?;
        let schema = state.registry.table(&table).await?;
        let (page_index, page_size) = page_bounds(state, params)?;

        let joins = resolve_joins(&schema, params)?;
        let columns = resolve_columns(&schema, &joins, params)?;
        let group_by = resolve_group_by(&schema, &joins, params)?;
        let sort = resolve_sort(&schema, &joins, &group_by, params)?;
        let searchable = schema.searchable();
        let filter = ConditionBuilder::build(&schema.table, params, &searchable, false);

        let mut query = SelectQuery::new(&schema.table)
            .filter(filter)
            .sort(sort)
            .casts(schema.casts());
        query.columns = columns;
        query.joins = joins;
        query.group_by = group_by;

        let mut tx = state.store.begin().await?;
        let mut dao = BaseDao::new(tx.as_mut());
        let total = dao.count(&query).await?;
        let rows = dao.query_list(query, page_index, page_size).await?;
        tracing::debug!(
            table = %table,
            user = ?principal.user_id,
            page_index,
            page_size,
            total,
            "list"
        );
        Ok(PageResult {
            items: rows
                .into_iter()
                .map(|r| Value::Object(strip_sensitive(&schema, r)))
                .collect(),
            total,
        })
    }

    /// Exactly one row by key, or `NotFound`. Other payload fields are ignored.
    pub async fn get_detail(state: &AppState, principal: &Principal, params: &Payload) -> Result<Record, AppError> {
        let table = target_table(params)?;
        let schema = state.registry.table(&table).await?;
        let key = record_key(params, &schema).ok_or_else(|| AppError::BadRequest(format!("{} is required", ID)))?;

        let filter = Filter::new().and(Predicate::eq(
            &format!("{}.{}", schema.table, schema.primary_key),
            key.clone(),
        ));
        let query = SelectQuery::new(&schema.table)
            .filter(filter)
            .casts(schema.casts())
            .page(1, 0);

        let mut tx = state.store.begin().await?;
        let row = tx.select(&query).await?.into_iter().next();
        tracing::debug!(table = %table, key = %key, user = ?principal.user_id, found = row.is_some(), "detail");
        row.map(|r| strip_sensitive(&schema, r))
            .ok_or_else(|| AppError::NotFound(format!("no {} row with key {}", table, key)))
    }

    /// Insert when the payload carries no positive key, else update. Validation, normalisation
    /// and the write share one transaction.
    pub async fn save_data(state: &AppState, principal: &Principal, params: &Payload) -> Result<Record, AppError> {
        let table = target_table(params)?;
        let schema = state.registry.table(&table).await?;
        let key = record_key(params, &schema);

        let mut tx = state.store.begin().await?;
        let saved = {
            let mut dao = BaseDao::new(tx.as_mut());
            match &key {
                Some(key) => update_one(state, &mut dao, &schema, principal, params, key).await?,
                None => insert_one(state, &mut dao, &schema, principal, params).await?,
            }
        };
        tx.commit().await?;
        tracing::info!(table = %table, key = ?key, user = ?principal.user_id, "saved");
        Ok(strip_sensitive(&schema, saved))
    }

    /// Inserts every object of `items` in one transaction; any invalid item aborts the batch.
    pub async fn save_batch(state: &AppState, principal: &Principal, params: &Payload) -> Result<Vec<Record>, AppError> {
        let table = target_table(params)?;
        let schema = state.registry.table(&table).await?;
        let items = params
            .get(ITEMS)
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("{} must be a non-empty array", ITEMS)))?;
        if items.len() > state.settings.batch_limit {
            return Err(AppError::BadRequest(format!(
                "at most {} items per batch",
                state.settings.batch_limit
            )));
        }

        let mut tx = state.store.begin().await?;
        let saved = {
            let mut dao = BaseDao::new(tx.as_mut());
            let mut violations = ValidationResult::new();
            let mut pending = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item = item
                    .as_object()
                    .ok_or_else(|| AppError::BadRequest(format!("{}[{}] must be an object", ITEMS, i)))?;
                let data = writable_fields(&schema, principal, item, None);
                let found = check(state, &mut dao, &schema, &data, None).await;
                violations.extend(found.prefixed(&format!("item {}: ", i + 1)));
                pending.push(data);
            }
            fail_on(violations)?;
            let mut rows = Vec::with_capacity(pending.len());
            for data in pending {
                rows.push(normalize(&schema, principal, data, true).await?);
            }
            dao.insert_batch(&schema, rows).await?
        };
        tx.commit().await?;
        tracing::info!(table = %table, count = saved.len(), user = ?principal.user_id, "batch saved");
        Ok(saved.into_iter().map(|r| strip_sensitive(&schema, r)).collect())
    }

    /// Deletes by the table's primary key; `NotFound` when nothing matched.
    pub async fn delete_data(state: &AppState, principal: &Principal, params: &Payload) -> Result<u64, AppError> {
        let table = target_table(params)?;
        let schema = state.registry.table(&table).await?;
        let key = record_key(params, &schema).ok_or_else(|| AppError::BadRequest(format!("{} is required", ID)))?;

        let mut tx = state.store.begin().await?;
        let n = BaseDao::new(tx.as_mut()).delete(&schema, &key).await?;
        if n == 0 {
            return Err(AppError::NotFound(format!("no {} row with key {}", table, key)));
        }
        tx.commit().await?;
        tracing::info!(table = %table, key = %key, user = ?principal.user_id, "deleted");
        Ok(n)
    }

    /// Verifies credentials against the user table and returns the user row with a `token`.
    /// Unknown user is `Unauthenticated`; wrong password is `InvalidCredential`.
    pub async fn login(state: &AppState, params: &Payload) -> Result<Record, AppError> {
        let (Some(username), Some(password)) = (
            str_param(params, USERNAME_COLUMN),
            params.get(PASSWORD_COLUMN).filter(|v| !is_blank(Some(*v))).and_then(value_text),
        ) else {
            return Err(AppError::BadRequest("username and password are required".into()));
        };
        let schema = state.registry.table(&state.settings.user_table).await?;
        let password_column = schema
            .password_columns()
            .next()
            .unwrap_or(PASSWORD_COLUMN)
            .to_string();

        let mut tx = state.store.begin().await?;
        let mut dao = BaseDao::new(tx.as_mut());
        let query = SelectQuery::new(&schema.table)
            .filter(Filter::new().and(Predicate::eq(USERNAME_COLUMN, Value::String(username.clone()))))
            .casts(schema.casts());
        let Some(mut user) = dao.query_list(query, 1, 1).await?.into_iter().next() else {
            tracing::warn!(username = %username, "login for unknown user");
            return Err(AppError::Unauthenticated("unknown user".into()));
        };
        let stored = user.get(&password_column).and_then(Value::as_str).unwrap_or("");
        if !verify_password(&password, stored).await {
            tracing::warn!(username = %username, "login with wrong password");
            return Err(AppError::InvalidCredential("wrong password".into()));
        }

        let key = user.get(&schema.primary_key).cloned().unwrap_or(Value::Null);
        if let Some(attr) = schema.column(LAST_LOGIN_COLUMN) {
            let now = audit_time(attr);
            let mut row = Record::new();
            row.insert(LAST_LOGIN_COLUMN.to_string(), now.clone());
            dao.update(&schema, row, &key).await?;
            user.insert(LAST_LOGIN_COLUMN.to_string(), now);
        }
        drop(dao);
        tx.commit().await?;

        let principal = Principal {
            user_id: as_i64(&key),
            username: username.clone(),
            org_id: user.get(ORG_COLUMN).and_then(as_i64),
            roles: user.get(ROLES_COLUMN).map(roles_of).unwrap_or_default(),
        };
        let token = state.tokens.issue(&principal)?;
        let mut record = strip_sensitive(&schema, user);
        record.remove(&password_column);
        record.insert("token".to_string(), Value::String(token));
        tracing::info!(username = %username, user_id = ?principal.user_id, "login succeeded");
        Ok(record)
    }

    pub async fn refresh(state: &AppState, token: &str) -> Result<String, AppError> {
        state.tokens.refresh(token)
    }

    pub async fn logout(_state: &AppState, principal: &Principal) -> Result<(), AppError> {
        tracing::info!(username = %principal.username, user_id = ?principal.user_id, "logout");
        Ok(())
    }
}

async fn insert_one(
    state: &AppState,
    dao: &mut BaseDao<'_>,
    schema: &TableSchema,
    principal: &Principal,
    params: &Payload,
) -> Result<Record, AppError> {
    let data = writable_fields(schema, principal, params, None);
    fail_on(check(state, dao, schema, &data, None).await)?;
    let row = normalize(schema, principal, data, true).await?;
    dao.insert(schema, row).await
}

async fn update_one(
    state: &AppState,
    dao: &mut BaseDao<'_>,
    schema: &TableSchema,
    principal: &Principal,
    params: &Payload,
    key: &Value,
) -> Result<Record, AppError> {
    let data = writable_fields(schema, principal, params, Some(key));
    fail_on(check(state, dao, schema, &data, Some(key)).await)?;
    let row = normalize(schema, principal, data, false).await?;
    if dao.update(schema, row, key).await? == 0 {
        return Err(AppError::NotFound(format!("no {} row with key {}", schema.table, key)));
    }
    dao.find_by_key(schema, key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no {} row with key {}", schema.table, key)))
}

fn is_audit_column(name: &str) -> bool {
    matches!(name, CREATE_TIME | UPDATE_TIME | CREATE_BY | UPDATE_BY)
}

/// Declared, role-permitted fields of the payload. The key column never travels as a
/// value on update; a blank password on update is left out so the stored hash stays.
fn writable_fields(schema: &TableSchema, principal: &Principal, params: &Payload, key: Option<&Value>) -> Payload {
    let mut data = Payload::new();
    for (name, value) in params {
        let Some(attr) = schema.column(name) else {
            continue;
        };
        let roles = attr.allowed_roles();
        if !roles.is_empty() && !principal.has_any_role(&roles) {
            tracing::debug!(table = %schema.table, column = %name, "field dropped: role not held");
            continue;
        }
        // integer keys are generated by the store on insert
        if *name == schema.primary_key && (key.is_some() || !attr.field_type.is_textual()) {
            continue;
        }
        if key.is_some() && attr.is_password() && is_blank(Some(value)) {
            continue;
        }
        data.insert(name.clone(), value.clone());
    }
    data
}

/// Field checks first; business rules only for data that passed them.
async fn check(
    state: &AppState,
    dao: &mut BaseDao<'_>,
    schema: &TableSchema,
    data: &Payload,
    key: Option<&Value>,
) -> ValidationResult {
    let result = match key {
        None => {
            let attrs: Vec<&ColumnAttribute> = schema
                .columns
                .iter()
                .filter(|a| a.edit_flag && !is_audit_column(&a.name))
                .collect();
            FieldValidator::validate(&attrs, data)
        }
        Some(_) => {
            let attrs: Vec<&ColumnAttribute> = schema
                .columns
                .iter()
                .filter(|a| a.name != schema.primary_key && !is_audit_column(&a.name))
                .collect();
            FieldValidator::validate_partial(&attrs, data)
        }
    };
    if !result.is_empty() {
        return result;
    }
    RuleValidator::validate(dao, schema, data, key, state.settings.rule_timeout).await
}

/// Duplicate-data violations are a conflict; everything else a validation failure.
fn fail_on(result: ValidationResult) -> Result<(), AppError> {
    if result.is_empty() {
        return Ok(());
    }
    let message = result.joined();
    if result.has_kind(ViolationKind::Duplicate) {
        Err(AppError::Conflict(message))
    } else {
        Err(AppError::Validation(message))
    }
}

/// Insert strips non-editable fields; passwords are hashed; audit columns are filled when
/// declared (all four on insert, `update_*` on update); values are converted to their
/// column types.
async fn normalize(schema: &TableSchema, principal: &Principal, mut data: Payload, insert: bool) -> Result<Record, AppError> {
    if insert {
        data.retain(|name, _| schema.column(name).map(|a| a.edit_flag).unwrap_or(false));
    }
    for attr in schema.columns.iter().filter(|a| a.is_password()) {
        let Some(value) = data.get(&attr.name) else {
            continue;
        };
        if is_blank(Some(value)) {
            data.remove(&attr.name);
            continue;
        }
        let plain = value_text(value).unwrap_or_default();
        let hashed = hash_password(&plain).await?;
        data.insert(attr.name.clone(), Value::String(hashed));
    }

    // a new row starts with both audit pairs set; an update touches only update_*
    let mut audit = vec![(UPDATE_TIME, UPDATE_BY)];
    if insert {
        audit.push((CREATE_TIME, CREATE_BY));
    }
    for (time_column, by_column) in audit {
        if let Some(attr) = schema.column(time_column) {
            data.insert(time_column.to_string(), audit_time(attr));
        }
        if schema.has_column(by_column) {
            data.insert(
                by_column.to_string(),
                principal.user_id.map(Value::from).unwrap_or(Value::Null),
            );
        }
    }

    let mut row = Record::new();
    for (name, value) in data {
        let value = match schema.column(&name) {
            Some(attr) => coerce_for_write(attr, &value),
            None => value,
        };
        row.insert(name, value);
    }
    Ok(row)
}

/// Now, in the representation of the column: date/time text for temporal columns,
/// epoch milliseconds otherwise.
fn audit_time(attr: &ColumnAttribute) -> Value {
    let now = chrono::Utc::now();
    match attr.field_type {
        FieldType::Datetime => Value::String(now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
        FieldType::Date => Value::String(now.format("%Y-%m-%d").to_string()),
        _ => Value::from(now.timestamp_millis()),
    }
}

/// Password-kind columns are never returned.
fn strip_sensitive(schema: &TableSchema, mut row: Record) -> Record {
    for name in schema.password_columns() {
        row.remove(name);
    }
    row
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn roles_of(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        Value::String(s) => split_list(s),
        _ => Vec::new(),
    }
}

fn page_bounds(state: &AppState, params: &Payload) -> Result<(u64, u64), AppError> {
    let page_index = int_param(params, PAGE_INDEX)?.unwrap_or(1);
    let page_size = int_param(params, PAGE_SIZE)?.unwrap_or(state.settings.default_page_size as i64);
    if page_index < 1 {
        return Err(AppError::BadRequest(format!("{} must be at least 1", PAGE_INDEX)));
    }
    if page_size < 1 {
        return Err(AppError::BadRequest(format!("{} must be at least 1", PAGE_SIZE)));
    }
    let page_size = (page_size as u64).min(state.settings.max_page_size);
    let offset = (page_index as u64 - 1).checked_mul(page_size);
    if offset.map_or(true, |o| o > i64::MAX as u64) {
        return Err(AppError::BadRequest(format!("{} is out of range", PAGE_INDEX)));
    }
    Ok((page_index as u64, page_size))
}

/// Join override by name, else every join the table declares.
fn resolve_joins(schema: &TableSchema, params: &Payload) -> Result<Vec<JoinSpec>, AppError> {
    let Some(names) = str_param(params, JOINS) else {
        return Ok(schema.config.joins.clone());
    };
    split_list(&names)
        .iter()
        .map(|n| {
            schema
                .join(n)
                .cloned()
                .ok_or_else(|| AppError::BadRequest(format!("unknown join: {}", n)))
        })
        .collect()
}

/// `column` of the main table or `table.column` of the main table or an active join.
fn check_column_ref(schema: &TableSchema, joins: &[JoinSpec], name: &str) -> Result<String, AppError> {
    let unknown = || AppError::BadRequest(format!("unknown column: {}", name));
    match name.split_once('.') {
        Some((t, c)) if t == schema.table && schema.has_column(c) => Ok(c.to_string()),
        Some((t, c)) if joins.iter().any(|j| j.table == t) && is_identifier(c) => Ok(name.to_string()),
        Some(_) => Err(unknown()),
        None if schema.has_column(name) => Ok(name.to_string()),
        None => Err(unknown()),
    }
}

fn resolve_columns(schema: &TableSchema, joins: &[JoinSpec], params: &Payload) -> Result<Vec<String>, AppError> {
    let source = str_param(params, COLUMNS).or_else(|| schema.config.defin_columns.clone());
    match source {
        Some(list) => split_list(&list).iter().map(|c| check_column_ref(schema, joins, c)).collect(),
        None => Ok(Vec::new()),
    }
}

fn resolve_group_by(schema: &TableSchema, joins: &[JoinSpec], params: &Payload) -> Result<Vec<String>, AppError> {
    let source = str_param(params, GROUP_BY).or_else(|| schema.config.groupby.clone());
    match source {
        Some(list) => split_list(&list).iter().map(|c| check_column_ref(schema, joins, c)).collect(),
        None => Ok(Vec::new()),
    }
}

/// `"col [ASC|DESC], ..."`. Defaults: table config, group columns, `create_time DESC`,
/// then primary key ascending.
fn resolve_sort(
    schema: &TableSchema,
    joins: &[JoinSpec],
    group_by: &[String],
    params: &Payload,
) -> Result<Vec<SortKey>, AppError> {
    let source = str_param(params, SORT).or_else(|| schema.config.sort.clone().filter(|s| !s.trim().is_empty()));
    let Some(spec) = source else {
        if !group_by.is_empty() {
            return Ok(group_by.iter().map(|c| SortKey::asc(c)).collect());
        }
        if schema.has_column(CREATE_TIME) {
            return Ok(vec![SortKey::desc(CREATE_TIME)]);
        }
        return Ok(vec![SortKey::asc(&schema.primary_key)]);
    };
    split_list(&spec)
        .iter()
        .map(|item| {
            let parts: Vec<&str> = item.split_whitespace().collect();
            let column = check_column_ref(schema, joins, parts[0])?;
            match parts.get(1..).unwrap_or(&[]) {
                [] => Ok(SortKey::asc(&column)),
                [dir] if dir.eq_ignore_ascii_case("asc") => Ok(SortKey::asc(&column)),
                [dir] if dir.eq_ignore_ascii_case("desc") => Ok(SortKey::desc(&column)),
                _ => Err(AppError::BadRequest(format!("invalid sort: {}", item))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{resolve_table, TableConfig};
    use serde_json::json;

    fn schema() -> TableSchema {
        let config = TableConfig {
            dbtable: "emp".into(),
            joins: vec![JoinSpec {
                name: "dept".into(),
                table: "sys_dept".into(),
                column: "dept_id".into(),
                ref_column: "id".into(),
            }],
            ..Default::default()
        };
        resolve_table(
            "emp",
            vec![
                ColumnAttribute::new("emp", "id", FieldType::BigInt).primary(),
                ColumnAttribute::new("emp", "name", FieldType::Varchar),
                ColumnAttribute::new("emp", "dept_id", FieldType::Int),
                ColumnAttribute::new("emp", CREATE_TIME, FieldType::Datetime),
            ],
            vec![],
            Some(config),
            None,
        )
        .unwrap()
        .unwrap()
    }

    fn payload(v: Value) -> Payload {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn sort_parsing_and_defaults() {
        let s = schema();
        let joins = s.config.joins.clone();
        let sort = resolve_sort(&s, &joins, &[], &payload(json!({"sortByAndType": "name desc, sys_dept.name"}))).unwrap();
        assert_eq!(sort, vec![SortKey::desc("name"), SortKey::asc("sys_dept.name")]);
        assert_eq!(resolve_sort(&s, &joins, &[], &payload(json!({}))).unwrap(), vec![SortKey::desc(CREATE_TIME)]);
        assert_eq!(
            resolve_sort(&s, &joins, &["dept_id".into()], &payload(json!({}))).unwrap(),
            vec![SortKey::asc("dept_id")]
        );
        assert!(resolve_sort(&s, &joins, &[], &payload(json!({"sortByAndType": "name; drop"}))).is_err());
        assert!(resolve_sort(&s, &joins, &[], &payload(json!({"sortByAndType": "salary"}))).is_err());
        assert!(resolve_sort(&s, &joins, &[], &payload(json!({"sortByAndType": "name up"}))).is_err());
    }

    #[test]
    fn columns_must_be_declared_or_joined() {
        let s = schema();
        let joins = resolve_joins(&s, &payload(json!({"joinString": "dept"}))).unwrap();
        assert_eq!(
            resolve_columns(&s, &joins, &payload(json!({"columns": "id, emp.name, sys_dept.name"}))).unwrap(),
            vec!["id", "name", "sys_dept.name"]
        );
        assert!(resolve_columns(&s, &[], &payload(json!({"columns": "sys_dept.name"}))).is_err());
        assert!(resolve_joins(&s, &payload(json!({"joinString": "nope"}))).is_err());
    }

    #[test]
    fn fail_on_maps_duplicates_to_conflict() {
        use crate::service::validation::Violation;
        let mut r = ValidationResult::new();
        r.push(Violation::new("code", ViolationKind::Duplicate, "dup"));
        assert!(matches!(fail_on(r), Err(AppError::Conflict(m)) if m == "dup"));
        let mut r = ValidationResult::new();
        r.push(Violation::new("a", ViolationKind::Required, "a is required"));
        r.push(Violation::new("b", ViolationKind::Type, "b must be an integer"));
        assert!(matches!(fail_on(r), Err(AppError::Validation(m)) if m == "a is required; b must be an integer"));
    }

    #[test]
    fn roles_from_text_or_array() {
        assert_eq!(roles_of(&json!("admin, ops")), vec!["admin", "ops"]);
        assert_eq!(roles_of(&json!(["admin"])), vec!["admin"]);
    }
}
