//! Common CRUD endpoints under `/api/common`.

use crate::handlers::common;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn crud_routes() -> Router<AppState> {
    Router::new()
        .route("/api/common/list", get(common::list))
        .route("/api/common/detail", get(common::detail))
        .route("/api/common/save", post(common::save))
        .route("/api/common/batch", post(common::batch))
        .route("/api/common/delete", post(common::delete))
        .route("/api/common/login", post(common::login))
        .route("/api/common/refresh", post(common::refresh))
        .route("/api/common/logout", post(common::logout))
}
