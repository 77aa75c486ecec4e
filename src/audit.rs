//! Request audit: every request runs in a span carrying a trace id, and its outcome is
//! written to the audit table by a detached task. Audit failures are only logged.

use crate::error::AppError;
use crate::extractors::bearer_token;
use crate::sql::{Casts, InsertStatement, Record};
use crate::state::AppState;
use crate::store::RelationalStore;
use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

const MASK: &str = "******";

#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub path: String,
    pub method: String,
    pub params: Option<String>,
    pub user_id: Option<i64>,
    pub duration_ms: i64,
    pub status: u16,
    pub error_message: Option<String>,
    pub trace_id: String,
    pub create_time: i64,
}

impl AuditEntry {
    fn into_record(self) -> Record {
        let mut r = Record::new();
        r.insert("path".into(), Value::String(self.path));
        r.insert("method".into(), Value::String(self.method));
        r.insert("params".into(), self.params.map(Value::String).unwrap_or(Value::Null));
        r.insert("user_id".into(), self.user_id.map(Value::from).unwrap_or(Value::Null));
        r.insert("duration".into(), Value::from(self.duration_ms));
        r.insert("status".into(), Value::from(self.status));
        r.insert(
            "error_message".into(),
            self.error_message.map(Value::String).unwrap_or(Value::Null),
        );
        r.insert("trace_id".into(), Value::String(self.trace_id));
        r.insert("create_time".into(), Value::from(self.create_time));
        r
    }
}

/// Writes one audit row in its own transaction.
pub async fn write_entry(store: &dyn RelationalStore, table: &str, entry: AuditEntry) -> Result<(), AppError> {
    let row = entry.into_record();
    let casts: Casts = [("user_id", "bigint"), ("duration", "bigint"), ("status", "integer"), ("create_time", "bigint")]
        .into_iter()
        .map(|(c, t)| (c.to_string(), t.to_string()))
        .collect();
    let stmt = InsertStatement {
        table: table.to_string(),
        key_column: "id".into(),
        columns: row.keys().cloned().collect(),
        rows: vec![row],
        casts,
    };
    let mut tx = store.begin().await?;
    tx.insert(&stmt).await?;
    tx.commit().await
}

/// Replaces password-like values in a JSON body.
fn mask_secrets(v: &mut Value) {
    match v {
        Value::Object(map) => {
            for (k, val) in map.iter_mut() {
                if k.to_lowercase().contains("password") {
                    *val = Value::String(MASK.into());
                } else {
                    mask_secrets(val);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

fn body_params(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(mut v) => {
            mask_secrets(&mut v);
            Some(v.to_string())
        }
        Err(_) => Some(format!("<{} bytes>", bytes.len())),
    }
}

/// Middleware: trace span, `x-trace-id` response header and a detached audit write.
pub async fn audit_layer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let trace_id = uuid::Uuid::new_v4().to_string();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let user_id = bearer_token(req.headers())
        .and_then(|t| state.tokens.verify(t).ok())
        .and_then(|c| c.user_id);
    let span = tracing::info_span!("request", trace_id = %trace_id, method = %method, path = %path);

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, state.settings.body_limit_bytes).await {
        Ok(b) => b,
        Err(e) => {
            let _enter = span.enter();
            return AppError::BadRequest(format!("request body: {}", e)).into_response();
        }
    };
    let params = match parts.uri.query() {
        Some(q) if !q.is_empty() => Some(q.to_string()),
        _ => body_params(&bytes),
    };
    let req = Request::from_parts(parts, Body::from(bytes));

    let started = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;
    let status = response.status();
    if let Ok(v) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, v);
    }
    let entry = AuditEntry {
        path,
        method,
        params,
        user_id,
        duration_ms: started.elapsed().as_millis() as i64,
        status: status.as_u16(),
        error_message: (!status.is_success()).then(|| status.canonical_reason().unwrap_or("error").to_string()),
        trace_id,
        create_time: chrono::Utc::now().timestamp_millis(),
    };
    span.in_scope(|| tracing::info!(status = entry.status, duration_ms = entry.duration_ms, "request finished"));

    if let Some(table) = state.settings.audit_table.clone() {
        let store: Arc<dyn RelationalStore> = state.store.clone();
        tokio::spawn(
            async move {
                if let Err(e) = write_entry(store.as_ref(), &table, entry).await {
                    tracing::warn!(error = %e, "audit write failed");
                }
            }
            .instrument(span),
        );
    }
    response
}
