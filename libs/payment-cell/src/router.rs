use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

// Callbacks come from the gateway and carry no bearer token.

pub fn appointment_payment_routes(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/{appointment_id}/callback", post(handlers::appointment_payment_callback));

    let protected_routes = Router::new()
        .route("/{appointment_id}", post(handlers::create_appointment_payment))
        .route("/{appointment_id}/status", get(handlers::appointment_payment_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

pub fn prescription_payment_routes(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/{prescription_id}/callback", post(handlers::prescription_payment_callback));

    let protected_routes = Router::new()
        .route("/{prescription_id}", post(handlers::create_prescription_payment))
        .route("/{prescription_id}/status", get(handlers::prescription_payment_status))
        .route("/{prescription_id}/cash", post(handlers::prescription_cash_payment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

pub fn retail_prescription_payment_routes(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route(
        "/{prescription_id}/callback",
        post(handlers::retail_prescription_payment_callback),
    );

    let protected_routes = Router::new()
        .route("/{prescription_id}", post(handlers::create_retail_prescription_payment))
        .route("/{prescription_id}/status", get(handlers::retail_prescription_payment_status))
        .route("/{prescription_id}/cash", post(handlers::retail_prescription_cash_payment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
