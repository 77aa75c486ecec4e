mod common;

use common::{admin, clerk, payload, record, state, state_with, settings};
use metacrud::metadata::{CREATE_TIME, UPDATE_TIME};
use metacrud::service::{BaseDao, RuleValidator, ViolationKind};
use metacrud::{AppError, CrudService, RelationalStore};
use serde_json::{json, Value};
use std::time::Duration;

fn seed_products(store: &metacrud::MemoryStore, n: i64) {
    store.seed(
        "product",
        (1..=n)
            .map(|i| {
                record(json!({
                    "id": i,
                    "code": format!("P{:03}", i),
                    "create_time": format!("2024-01-01 00:00:{:02}", i),
                }))
            })
            .collect(),
    );
}

#[tokio::test]
async fn list_returns_requested_page_and_total() {
    let (state, store) = state();
    seed_products(&store, 25);
    let page = CrudService::get_list(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "pageIndex": 2, "pageSize": 10})),
    )
    .await
    .unwrap();
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.total, 25);
    // default order is create_time descending
    assert_eq!(page.items[0]["code"], json!("P015"));

    let last = CrudService::get_list(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "pageIndex": "3", "pageSize": "10"})),
    )
    .await
    .unwrap();
    assert_eq!(last.items.len(), 5);
}

#[tokio::test]
async fn list_filters_on_searchable_columns() {
    let (state, store) = state();
    seed_products(&store, 25);
    let page = CrudService::get_list(
        &state,
        &admin(),
        &payload(json!({
            "targetTable": "product",
            "code": "P01",
            "sortByAndType": "code asc"
        })),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 10);
    assert_eq!(page.items[0]["code"], json!("P010"));
}

#[tokio::test]
async fn list_rejects_bad_paging_and_unknown_tables() {
    let (state, _store) = state();
    for bad in [
        json!({"targetTable": "product", "pageIndex": 0}),
        json!({"targetTable": "product", "pageSize": -1}),
        json!({"targetTable": "product", "pageIndex": i64::MAX}),
        json!({"targetTable": "product", "sortByAndType": "price; drop table product"}),
        json!({"targetTable": "nope"}),
        json!({}),
    ] {
        let err = CrudService::get_list(&state, &admin(), &payload(bad)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "{:?}", err);
    }
}

#[tokio::test]
async fn page_size_is_capped() {
    let mut s = settings();
    s.max_page_size = 5;
    let (state, store) = state_with(s);
    seed_products(&store, 12);
    let page = CrudService::get_list(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "pageSize": 1000})),
    )
    .await
    .unwrap();
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total, 12);
}

#[tokio::test]
async fn detail_is_idempotent_and_missing_rows_are_not_found() {
    let (state, store) = state();
    seed_products(&store, 3);
    let params = payload(json!({"targetTable": "product", "id": 2}));
    let first = CrudService::get_detail(&state, &admin(), &params).await.unwrap();
    let second = CrudService::get_detail(&state, &admin(), &params).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first["code"], json!("P002"));

    let other = CrudService::get_detail(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "id": 2, "code": "OTHER"})),
    )
    .await
    .unwrap();
    assert_eq!(other, first);

    let err = CrudService::get_detail(&state, &admin(), &payload(json!({"targetTable": "product", "id": 99})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 404);
    let err = CrudService::get_detail(&state, &admin(), &payload(json!({"targetTable": "product"})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
}

#[tokio::test]
async fn save_without_positive_id_inserts_with_audit_columns() {
    let (state, store) = state();
    for id in [json!(null), json!(0), json!(-4)] {
        let before = store.rows("product").len();
        let code = format!("N{}", before);
        let saved = CrudService::save_data(
            &state,
            &admin(),
            &payload(json!({"targetTable": "product", "id": id, "code": code})),
        )
        .await
        .unwrap();
        let rows = store.rows("product");
        assert_eq!(rows.len(), before + 1);
        assert!(saved["id"].as_i64().unwrap() > 0);
        assert!(rows[before][CREATE_TIME].is_string());
    }

    let saved = CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "sys_user", "username": "zed", "password": "pw"})),
    )
    .await
    .unwrap();
    let row = store.rows("sys_user")[0].clone();
    assert!(row[CREATE_TIME].is_string());
    assert!(row[UPDATE_TIME].is_string());
    assert_eq!(row["create_by"], json!(1));
    assert_eq!(row["update_by"], json!(1));

    CrudService::save_data(
        &state,
        &clerk(),
        &payload(json!({"targetTable": "sys_user", "id": saved["id"], "nickname": "z"})),
    )
    .await
    .unwrap();
    let row = store.rows("sys_user")[0].clone();
    assert_eq!(row["create_by"], json!(1));
    assert_eq!(row["update_by"], json!(2));
}

#[tokio::test]
async fn non_editable_fields_are_never_inserted() {
    let (state, store) = state();
    CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({
            "targetTable": "product",
            "code": "X1",
            "internal_note": "should vanish",
            "not_a_column": 1
        })),
    )
    .await
    .unwrap();
    let row = &store.rows("product")[0];
    assert!(!row.contains_key("internal_note"));
    assert!(!row.contains_key("not_a_column"));
    assert_eq!(row["code"], json!("X1"));
}

#[tokio::test]
async fn role_restricted_fields_need_the_role() {
    let (state, store) = state();
    CrudService::save_data(
        &state,
        &clerk(),
        &payload(json!({"targetTable": "product", "code": "R1", "salary": 100})),
    )
    .await
    .unwrap();
    CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "code": "R2", "salary": "200"})),
    )
    .await
    .unwrap();
    let rows = store.rows("product");
    assert!(!rows[0].contains_key("salary"));
    assert_eq!(rows[1]["salary"], json!(200));
}

#[tokio::test]
async fn update_changes_only_submitted_fields() {
    let (state, store) = state();
    seed_products(&store, 1);
    let saved = CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "id": "1", "price": "9.5", "code": "P001"})),
    )
    .await
    .unwrap();
    assert_eq!(saved["price"], json!(9.5));
    assert_eq!(saved["code"], json!("P001"));
    assert_eq!(store.rows("product").len(), 1);

    let err = CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "id": 42, "price": 1})),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), 404);
}

#[tokio::test]
async fn password_is_hashed_and_blank_update_keeps_it() {
    let (state, store) = state();
    let saved = CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "sys_user", "username": "bob", "password": "pw-one"})),
    )
    .await
    .unwrap();
    assert!(!saved.contains_key("password"));
    let id = saved["id"].clone();
    let stored = store.rows("sys_user")[0]["password"].as_str().unwrap().to_string();
    assert_ne!(stored, "pw-one");
    assert!(stored.starts_with("$argon2"));

    CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "sys_user", "id": id, "password": "  ", "nickname": "bobby"})),
    )
    .await
    .unwrap();
    let row = store.rows("sys_user")[0].clone();
    assert_eq!(row["password"].as_str().unwrap(), stored);
    assert_eq!(row["nickname"], json!("bobby"));
    assert_eq!(row["update_by"], json!(1));

    CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "sys_user", "id": id, "password": "pw-two"})),
    )
    .await
    .unwrap();
    let changed = store.rows("sys_user")[0]["password"].as_str().unwrap().to_string();
    assert_ne!(changed, stored);
    assert_ne!(changed, "pw-two");
}

#[tokio::test]
async fn varchar_length_is_enforced_on_save() {
    let (state, store) = state();
    let err = CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "sys_user", "username": "amy", "nickname": "abcdef"})),
    )
    .await
    .unwrap_err();
    match err {
        AppError::Validation(msg) => assert!(!msg.contains("; "), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
    assert!(store.rows("sys_user").is_empty());

    CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "sys_user", "username": "amy", "nickname": "abcde"})),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn multi_field_repeat_reports_one_error() {
    let (state, store) = state();
    let err = CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "code": "M1", "a": "x", "b": "x"})),
    )
    .await
    .unwrap_err();
    match err {
        AppError::Validation(msg) => {
            assert_eq!(msg, "a,b: fields must differ");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(store.rows("product").is_empty());

    CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "code": "M1", "a": "x", "b": "y"})),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn is_exist_counts_the_target_table() {
    let (state, store) = state();
    let schema = state.registry.table("product").await.unwrap();
    let data = payload(json!({"code": "Z", "category_id": "7"}));

    let mut tx = store.begin().await.unwrap();
    let mut dao = BaseDao::new(tx.as_mut());
    let result = RuleValidator::validate(&mut dao, &schema, &data, None, Duration::from_secs(1)).await;
    assert_eq!(result.len(), 1);
    assert_eq!(result.violations[0].kind, ViolationKind::NotFound);
    assert!(result.violations[0].message.contains("data not found"));
    drop(dao);
    drop(tx);

    store.seed("category", vec![record(json!({"id": 7, "name": "tools"}))]);
    let mut tx = store.begin().await.unwrap();
    let mut dao = BaseDao::new(tx.as_mut());
    let result = RuleValidator::validate(&mut dao, &schema, &data, None, Duration::from_secs(1)).await;
    assert!(result.is_empty(), "{:?}", result);
}

#[tokio::test]
async fn duplicate_is_a_conflict_but_not_against_itself() {
    let (state, store) = state();
    let first = CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "code": "D1"})),
    )
    .await
    .unwrap();
    let err = CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "code": "D1"})),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.code(), 400);
    assert_eq!(store.rows("product").len(), 1);

    CrudService::save_data(
        &state,
        &admin(),
        &payload(json!({"targetTable": "product", "id": first["id"], "code": "D1", "price": 3})),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn failing_rule_does_not_stop_the_others() {
    let (state, store) = state();
    let schema = state.registry.table("gadget").await.unwrap();
    let data = payload(json!({"code": "c", "a": "same", "b": "same", "age": 70}));
    let mut tx = store.begin().await.unwrap();
    let mut dao = BaseDao::new(tx.as_mut());
    let result = RuleValidator::validate(&mut dao, &schema, &data, None, Duration::from_secs(1)).await;
    let kinds: Vec<ViolationKind> = result.violations.iter().map(|v| v.kind).collect();
    assert_eq!(
        kinds,
        vec![ViolationKind::RuleFailure, ViolationKind::FieldsMustDiffer, ViolationKind::Range]
    );
    assert!(result.violations[0].message.starts_with("rule evaluation failed ["));

    let ok = payload(json!({"a": "x", "b": "y", "age": 18}));
    let result = RuleValidator::validate(&mut dao, &schema, &ok, None, Duration::from_secs(1)).await;
    assert!(result.is_empty(), "{:?}", result);
}

#[tokio::test]
async fn delete_by_primary_key() {
    let (state, store) = state();
    seed_products(&store, 2);
    let n = CrudService::delete_data(&state, &admin(), &payload(json!({"targetTable": "product", "id": 1})))
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(store.rows("product").len(), 1);

    let err = CrudService::delete_data(&state, &admin(), &payload(json!({"targetTable": "product", "id": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 404);
    let err = CrudService::delete_data(&state, &admin(), &payload(json!({"targetTable": "product"})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let (state, store) = state();
    let saved = CrudService::save_batch(
        &state,
        &admin(),
        &payload(json!({
            "targetTable": "product",
            "items": [{"code": "B1", "a": "1"}, {"code": "B2", "a": "2"}]
        })),
    )
    .await
    .unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(store.rows("product").len(), 2);

    let err = CrudService::save_batch(
        &state,
        &admin(),
        &payload(json!({
            "targetTable": "product",
            "items": [{"code": "B3"}, {"code": ""}]
        })),
    )
    .await
    .unwrap_err();
    match err {
        AppError::Validation(msg) => assert!(msg.starts_with("item 2: "), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(store.rows("product").len(), 2);

    let mut s = settings();
    s.batch_limit = 1;
    let (limited, _) = state_with(s);
    let err = CrudService::save_batch(
        &limited,
        &admin(),
        &payload(json!({"targetTable": "product", "items": [{"code": "a"}, {"code": "b"}]})),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), 400);
}

async fn create_user(state: &metacrud::AppState) -> Value {
    let saved = CrudService::save_data(
        state,
        &admin(),
        &payload(json!({
            "targetTable": "sys_user",
            "username": "carol",
            "password": "s3cret",
            "org_id": 9,
            "roles": "admin,ops"
        })),
    )
    .await
    .unwrap();
    saved["id"].clone()
}

#[tokio::test]
async fn login_distinguishes_unknown_user_from_wrong_password() {
    let (state, _store) = state();
    create_user(&state).await;

    let err = CrudService::login(&state, &payload(json!({"username": "carol", "password": "nope"})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 402);
    let err = CrudService::login(&state, &payload(json!({"username": "dave", "password": "s3cret"})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 401);
    let err = CrudService::login(&state, &payload(json!({"username": "carol"})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 400);
}

#[tokio::test]
async fn login_returns_user_without_password_and_a_token() {
    let (state, store) = state();
    let id = create_user(&state).await;

    let user = CrudService::login(&state, &payload(json!({"username": "carol", "password": "s3cret"})))
        .await
        .unwrap();
    assert!(!user.contains_key("password"));
    let token = user["token"].as_str().unwrap();
    assert!(!token.is_empty());
    assert!(store.rows("sys_user")[0]["last_login_time"].is_string());

    let claims = state.tokens.verify(token).unwrap();
    assert_eq!(claims.user_id, id.as_i64());
    assert_eq!(claims.username, "carol");
    assert_eq!(claims.org_id, Some(9));
    assert_eq!(claims.roles, vec!["admin", "ops"]);

    let same = CrudService::refresh(&state, token).await.unwrap();
    assert_eq!(same, token);
}
