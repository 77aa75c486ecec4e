//! Standard response envelope: `{code, result, message, timestamp}`. All four keys are
//! always present; the unused one of `result`/`message` is `null`.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ResultData<T> {
    pub code: u16,
    pub result: Option<T>,
    pub message: Option<String>,
    /// Epoch milliseconds at which the envelope was built.
    pub timestamp: i64,
}

impl<T> ResultData<T> {
    pub fn success(data: T) -> Self {
        ResultData {
            code: 200,
            result: Some(data),
            message: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn fail(code: u16, message: String) -> Self {
        ResultData {
            code,
            result: None,
            message: Some(message),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Items of one page plus the match count ignoring paging.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub items: Vec<serde_json::Value>,
    pub total: u64,
}

pub fn success<T: Serialize>(data: T) -> (StatusCode, Json<ResultData<T>>) {
    (StatusCode::OK, Json(ResultData::success(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_always_carries_four_keys() {
        let ok = serde_json::to_value(ResultData::success(json!({"id": 1}))).unwrap();
        assert_eq!(ok["code"], json!(200));
        assert_eq!(ok["result"]["id"], json!(1));
        assert!(ok.get("message").unwrap().is_null());

        let failed = serde_json::to_value(ResultData::<serde_json::Value>::fail(404, "missing".into())).unwrap();
        let keys: Vec<&String> = failed.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        assert!(failed.get("result").unwrap().is_null());
        assert_eq!(failed["message"], json!("missing"));
        assert!(failed["timestamp"].as_i64().unwrap() > 0);
    }
}
