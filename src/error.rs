//! Typed errors and HTTP mapping.

use crate::response::ResultData;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("no column attributes declared for table '{0}'")]
    UnknownTable(String),
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    #[error("table '{table}' has no primary key column")]
    MissingPrimaryKey { table: String },
    #[error("table '{table}' declares more than one primary key column")]
    CompositePrimaryKey { table: String },
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("metadata load: {0}")]
    Load(String),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    InvalidCredential(String),
    #[error("{0}")]
    NotFound(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("store: {0}")]
    Store(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    /// Envelope code; also used as the HTTP status.
    pub fn code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) | AppError::Conflict(_) => 400,
            AppError::Unauthenticated(_) => 401,
            AppError::InvalidCredential(_) => 402,
            AppError::NotFound(_) => 404,
            AppError::Metadata(_) | AppError::Db(_) | AppError::Store(_) | AppError::Internal(_) => 500,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.code() >= 500
    }

    /// Message shown to the caller. Internal failures are reduced to a generic text.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
        let code = self.code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body: ResultData<serde_json::Value> = ResultData::fail(code, self.public_message());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_codes() {
        assert_eq!(AppError::Validation("x".into()).code(), 400);
        assert_eq!(AppError::Conflict("x".into()).code(), 400);
        assert_eq!(AppError::Unauthenticated("x".into()).code(), 401);
        assert_eq!(AppError::InvalidCredential("x".into()).code(), 402);
        assert_eq!(AppError::NotFound("x".into()).code(), 404);
        assert_eq!(AppError::Store("boom".into()).code(), 500);
    }

    #[test]
    fn internal_detail_is_not_public() {
        let err = AppError::Store("relation \"secret\" does not exist".into());
        assert_eq!(err.public_message(), "internal server error");
        let err = AppError::Validation("field age is required".into());
        assert_eq!(err.public_message(), "field age is required");
    }
}
