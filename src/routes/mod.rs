mod common;
mod crud;

pub use common::common_routes;
pub use crud::crud_routes;

use crate::audit::audit_layer;
use crate::state::AppState;
use axum::{middleware, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Full application: CRUD and common routes, request audit and body limit.
pub fn app(state: AppState) -> Router {
    let body_limit = state.settings.body_limit_bytes;
    Router::new()
        .merge(crud_routes())
        .merge(common_routes())
        .layer(middleware::from_fn_with_state(state.clone(), audit_layer))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
