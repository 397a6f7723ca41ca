use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn prescription_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_prescription))
        .route("/{prescription_id}", get(handlers::get_prescription))
        .route("/{prescription_id}/prepare", post(handlers::prepare_prescription))
        .route("/{prescription_id}/complete", post(handlers::complete_prescription))
        .route("/{prescription_id}/cancel", post(handlers::cancel_prescription))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn retail_prescription_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_retail_prescription))
        .route("/{prescription_id}", get(handlers::get_retail_prescription))
        .route("/{prescription_id}/prepare", post(handlers::prepare_retail_prescription))
        .route("/{prescription_id}/complete", post(handlers::complete_retail_prescription))
        .route("/{prescription_id}/cancel", post(handlers::cancel_retail_prescription))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn batch_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/{batch_id}/dispose", post(handlers::dispose_batch))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
