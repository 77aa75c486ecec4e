#![allow(dead_code)]

use metacrud::auth::Principal;
use metacrud::metadata::{CheckMode, ColumnAttribute, FieldType, StaticMetadata, ValidationRule};
use metacrud::service::Payload;
use metacrud::sql::Record;
use metacrud::{AppState, MemoryStore, Settings};
use serde_json::Value;
use std::sync::Arc;

pub fn payload(v: Value) -> Payload {
    v.as_object().cloned().expect("object payload")
}

pub fn record(v: Value) -> Record {
    payload(v)
}

pub fn admin() -> Principal {
    Principal::new(1, "admin").with_roles(&["admin"])
}

pub fn clerk() -> Principal {
    Principal::new(2, "clerk")
}

fn user_columns() -> Vec<ColumnAttribute> {
    let t = "sys_user";
    vec![
        ColumnAttribute::new(t, "id", FieldType::BigInt).primary(),
        ColumnAttribute::new(t, "username", FieldType::Varchar)
            .required()
            .editable()
            .searchable()
            .with_len(32),
        ColumnAttribute::new(t, "password", FieldType::Varchar)
            .editable()
            .with_show_type("password"),
        ColumnAttribute::new(t, "nickname", FieldType::Varchar).editable().with_len(5),
        ColumnAttribute::new(t, "org_id", FieldType::BigInt).editable(),
        ColumnAttribute::new(t, "roles", FieldType::Varchar).editable(),
        ColumnAttribute::new(t, "last_login_time", FieldType::Datetime),
        ColumnAttribute::new(t, "create_time", FieldType::Datetime),
        ColumnAttribute::new(t, "create_by", FieldType::BigInt),
        ColumnAttribute::new(t, "update_time", FieldType::Datetime),
        ColumnAttribute::new(t, "update_by", FieldType::BigInt),
    ]
}

fn product_columns() -> Vec<ColumnAttribute> {
    let t = "product";
    vec![
        ColumnAttribute::new(t, "id", FieldType::BigInt).primary(),
        ColumnAttribute::new(t, "code", FieldType::Varchar)
            .required()
            .editable()
            .searchable()
            .with_len(20),
        ColumnAttribute::new(t, "a", FieldType::Varchar).editable(),
        ColumnAttribute::new(t, "b", FieldType::Varchar).editable(),
        ColumnAttribute::new(t, "category_id", FieldType::Int).editable().searchable(),
        ColumnAttribute::new(t, "price", FieldType::Decimal).editable(),
        ColumnAttribute::new(t, "internal_note", FieldType::Varchar),
        ColumnAttribute::new(t, "salary", FieldType::Int).editable().with_roles("admin"),
        ColumnAttribute::new(t, "create_time", FieldType::Datetime).searchable(),
    ]
}

fn product_rules() -> Vec<ValidationRule> {
    vec![
        ValidationRule::new("product", CheckMode::MultiFieldRepeat, "a,b"),
        ValidationRule::new("product", CheckMode::IsNotExist, "code"),
        ValidationRule::new("product", CheckMode::IsExist, "category_id")
            .with_target_table("category")
            .with_where("id = %s"),
    ]
}

fn gadget_columns() -> Vec<ColumnAttribute> {
    let t = "gadget";
    vec![
        ColumnAttribute::new(t, "id", FieldType::BigInt).primary(),
        ColumnAttribute::new(t, "code", FieldType::Varchar).editable(),
        ColumnAttribute::new(t, "a", FieldType::Varchar).editable(),
        ColumnAttribute::new(t, "b", FieldType::Varchar).editable(),
        ColumnAttribute::new(t, "age", FieldType::Int).editable(),
    ]
}

fn gadget_rules() -> Vec<ValidationRule> {
    vec![
        ValidationRule::new("gadget", CheckMode::IsExist, "code").with_where("code = = %s"),
        ValidationRule::new("gadget", CheckMode::MultiFieldRepeat, "a,b"),
        ValidationRule::new("gadget", CheckMode::IsRange, "age"),
        ValidationRule::new("gadget", CheckMode::Unknown("regex".into()), "code"),
    ]
}

pub fn metadata() -> StaticMetadata {
    let mut meta = StaticMetadata::new();
    meta.columns.extend(user_columns());
    meta.columns.extend(product_columns());
    meta.columns.extend(gadget_columns());
    meta.columns.push(ColumnAttribute::new("category", "id", FieldType::BigInt).primary());
    meta.columns.push(ColumnAttribute::new("category", "name", FieldType::Varchar).editable());
    meta.rules.extend(product_rules());
    meta.rules.extend(gadget_rules());
    meta
}

pub fn settings() -> Settings {
    Settings::new("postgres://localhost/unused", "integration-secret")
}

pub fn state_with(settings: Settings) -> (AppState, MemoryStore) {
    let store = MemoryStore::new();
    let state = AppState::new(Arc::new(store.clone()), Arc::new(metadata()), settings);
    (state, store)
}

pub fn state() -> (AppState, MemoryStore) {
    state_with(settings())
}
