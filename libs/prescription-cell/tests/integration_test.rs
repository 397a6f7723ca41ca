use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use prescription_cell::router::{batch_routes, prescription_routes, retail_prescription_routes};
use shared_config::ClinicHours;
use shared_database::store::{InventoryStore, PaymentStore};
use shared_models::appointment::AppointmentStatus;
use shared_models::inventory::BatchStatus;
use shared_models::payment::{PaymentKind, PaymentPatch, PaymentStatus};
use shared_utils::test_utils::{Fixtures, JwtTestUtils, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn retail_prescription_is_dispensed_only_after_payment() {
    let config = TestConfig::default();
    let (state, store) = config.to_state();
    let pharmacist = TestUser::pharmacist("ph@example.com");
    let token = JwtTestUtils::create_test_token(&pharmacist, &config.jwt_secret, Some(1));
    let today = ClinicHours::default().local_date(Utc::now());
    store.seed_batch(Fixtures::batch(1, 500, 20, today + Duration::days(30))).await;

    let response = retail_prescription_routes(state.clone())
        .oneshot(post(
            "/",
            &token,
            Some(json!({
                "patient_id": Uuid::new_v4(),
                "note": "walk-in",
                "medicines": [{"medicine_id": 500, "quantity": 2, "unit_price": 12_000, "dosage": null}]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let id = body_json(response).await["prescription"]["id"].as_i64().unwrap();

    let response = retail_prescription_routes(state.clone())
        .oneshot(post(&format!("/{}/prepare", id), &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["prescription"]["status"], "waiting_payment");
    assert_eq!(body["total"], 24_000);
    let payment_id = body["payment"]["id"].as_i64().unwrap();

    let response = retail_prescription_routes(state.clone())
        .oneshot(post(&format!("/{}/complete", id), &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    store
        .update_payment(
            PaymentKind::RetailPrescription,
            payment_id,
            PaymentStatus::Pending,
            PaymentPatch {
                status: Some(PaymentStatus::Paid),
                payment_method: Some("cash".to_string()),
                paid_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = retail_prescription_routes(state.clone())
        .oneshot(post(&format!("/{}/complete", id), &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["prescription"]["status"], "completed");
    assert_eq!(body["dispensed"][0]["quantity"], 2);
    assert_eq!(store.get_batch(1).await.unwrap().unwrap().quantity, 18);

    let response = retail_prescription_routes(state)
        .oneshot(get(&format!("/{}", id), &token))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["payment"]["status"], "paid");
}

#[tokio::test]
async fn only_the_treating_doctor_prescribes() {
    let config = TestConfig::default();
    let (state, store) = config.to_state();
    let doctor = TestUser::doctor("doc@example.com");
    let colleague = TestUser::doctor("other@example.com");
    let patient = TestUser::patient("pat@example.com");
    store
        .seed_appointment(Fixtures::appointment(
            42,
            patient.uuid(),
            doctor.uuid(),
            Utc::now() - Duration::hours(3),
            AppointmentStatus::Completed,
        ))
        .await;

    let body = json!({
        "appointment_id": 42,
        "note": null,
        "medicines": [{"medicine_id": 1, "quantity": 1, "unit_price": 30_000, "dosage": "once"}]
    });

    let colleague_token = JwtTestUtils::create_test_token(&colleague, &config.jwt_secret, Some(1));
    let response = prescription_routes(state.clone())
        .oneshot(post("/", &colleague_token, Some(body.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let doctor_token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, Some(1));
    let response = prescription_routes(state.clone())
        .oneshot(post("/", &doctor_token, Some(body.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let id = body_json(response).await["prescription"]["id"].as_i64().unwrap();

    let response = prescription_routes(state.clone())
        .oneshot(post("/", &doctor_token, Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let patient_token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, Some(1));
    let response = prescription_routes(state.clone())
        .oneshot(get(&format!("/{}", id), &patient_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total"], 30_000);

    let response = prescription_routes(state)
        .oneshot(get(&format!("/{}", id), &colleague_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pharmacist_disposes_expired_batch() {
    let config = TestConfig::default();
    let (state, store) = config.to_state();
    let today = ClinicHours::default().local_date(Utc::now());
    let mut batch = Fixtures::batch(7, 500, 4, today - Duration::days(2));
    batch.status = BatchStatus::Expired;
    store.seed_batch(batch).await;

    let patient = TestUser::patient("pat@example.com");
    let patient_token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, Some(1));
    let response = batch_routes(state.clone())
        .oneshot(post("/7/dispose", &patient_token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let pharmacist = TestUser::pharmacist("ph@example.com");
    let token = JwtTestUtils::create_test_token(&pharmacist, &config.jwt_secret, Some(1));
    let response = batch_routes(state.clone())
        .oneshot(post("/7/dispose", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["batch"]["status"], "Disposed");

    let response = batch_routes(state)
        .oneshot(post("/7/dispose", &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
