use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::{appointment_routes, day_off_routes};
use doctor_cell::router::doctor_routes;
use payment_cell::{
    appointment_payment_routes, prescription_payment_routes, retail_prescription_payment_routes,
};
use prescription_cell::{batch_routes, prescription_routes, retail_prescription_routes};
use shared_utils::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/doctor-appointments", appointment_routes(state.clone()))
        .nest("/doctor-day-offs", day_off_routes(state.clone()))
        .nest("/prescriptions", prescription_routes(state.clone()))
        .nest("/retail-prescriptions", retail_prescription_routes(state.clone()))
        .nest("/batches", batch_routes(state.clone()))
        .nest("/payments/appointments", appointment_payment_routes(state.clone()))
        .nest("/payments/prescriptions", prescription_payment_routes(state.clone()))
        .nest(
            "/payments/retail-prescriptions",
            retail_prescription_payment_routes(state),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use shared_database::InMemoryStore;
    use shared_utils::test_utils::TestConfig;
    use tower::ServiceExt;

    fn app() -> Router {
        let config = TestConfig::default().to_arc();
        create_router(Arc::new(AppState::new(config, Arc::new(InMemoryStore::new()))))
    }

    #[tokio::test]
    async fn liveness_is_public() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cells_are_mounted_behind_auth() {
        for (method, uri) in [
            ("POST", "/doctor-appointments/1/accept"),
            ("POST", "/doctor-day-offs"),
            ("GET", "/prescriptions/1"),
            ("POST", "/batches/1/dispose"),
            ("GET", "/payments/appointments/1/status"),
            ("POST", "/payments/retail-prescriptions/1/cash"),
        ] {
            let response = app()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn gateway_callbacks_skip_auth() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/appointments/1/callback")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
