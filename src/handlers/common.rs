//! Handlers for the common CRUD endpoints. Every handler returns the standard envelope.

use crate::error::AppError;
use crate::extractors::{bearer_token, AuthPrincipal};
use crate::response::{success, PageResult, ResultData};
use crate::service::{CrudService, Payload};
use crate::sql::Record;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

type Envelope<T> = Result<(StatusCode, Json<ResultData<T>>), AppError>;

fn query_to_payload(query: HashMap<String, String>) -> Payload {
    query.into_iter().map(|(k, v)| (k, Value::String(v))).collect()
}

fn body_to_payload(body: Value) -> Result<Payload, AppError> {
    match body {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<HashMap<String, String>>,
) -> Envelope<PageResult> {
    let params = query_to_payload(query);
    Ok(success(CrudService::get_list(&state, &principal, &params).await?))
}

pub async fn detail(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<HashMap<String, String>>,
) -> Envelope<Record> {
    let params = query_to_payload(query);
    Ok(success(CrudService::get_detail(&state, &principal, &params).await?))
}

pub async fn save(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(body): Json<Value>,
) -> Envelope<Record> {
    let params = body_to_payload(body)?;
    Ok(success(CrudService::save_data(&state, &principal, &params).await?))
}

pub async fn batch(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(body): Json<Value>,
) -> Envelope<Vec<Record>> {
    let params = body_to_payload(body)?;
    Ok(success(CrudService::save_batch(&state, &principal, &params).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(body): Json<Value>,
) -> Envelope<Value> {
    let params = body_to_payload(body)?;
    let deleted = CrudService::delete_data(&state, &principal, &params).await?;
    Ok(success(json!({ "deleted": deleted })))
}

pub async fn login(State(state): State<AppState>, Json(body): Json<Value>) -> Envelope<Record> {
    let params = body_to_payload(body)?;
    Ok(success(CrudService::login(&state, &params).await?))
}

pub async fn refresh(
    State(state): State<AppState>,
    AuthPrincipal(_principal): AuthPrincipal,
    headers: HeaderMap,
) -> Envelope<Value> {
    let token = bearer_token(&headers).unwrap_or_default();
    let token = CrudService::refresh(&state, token).await?;
    Ok(success(json!({ "token": token })))
}

pub async fn logout(State(state): State<AppState>, AuthPrincipal(principal): AuthPrincipal) -> Envelope<Value> {
    CrudService::logout(&state, &principal).await?;
    Ok(success(Value::Null))
}
