use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots))
        .route("/{doctor_id}/schedule", get(handlers::get_schedule))
        .route("/{doctor_id}/day-offs", get(handlers::get_day_offs));

    let protected_routes = Router::new()
        .route("/{doctor_id}/schedule", put(handlers::update_schedule))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
