use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde_json::json;
use tower::ServiceExt;

use doctor_cell::router::doctor_routes;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn next_monday() -> NaiveDate {
    let start = Utc::now().date_naive() + Duration::days(14);
    start + Duration::days(7 - i64::from(start.weekday().num_days_from_monday()))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn schedule_update_requires_token() {
    let config = TestConfig::default();
    let (state, _store) = config.to_state();
    let app = doctor_routes(state);

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/{}/schedule", uuid::Uuid::new_v4()))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"monday": true}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn schedule_then_slots_round_trip() {
    let config = TestConfig::default();
    let (state, _store) = config.to_state();
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, Some(1));
    let monday = next_monday();

    let update = Request::builder()
        .method("PUT")
        .uri(format!("/{}/schedule", doctor.id))
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({
                "monday": false,
                "tuesday": true,
                "wednesday": true,
                "thursday": true,
                "friday": true,
                "saturday": false,
                "sunday": false
            })
            .to_string(),
        ))
        .unwrap();

    let response = doctor_routes(state.clone()).oneshot(update).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let slots = Request::builder()
        .method("GET")
        .uri(format!(
            "/{}/available-slots?from={}&to={}",
            doctor.id,
            monday,
            monday + Duration::days(1)
        ))
        .body(Body::empty())
        .unwrap();

    let response = doctor_routes(state).oneshot(slots).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = body_json(response).await;
    assert_eq!(json_response["days"][0]["reason"], "weekday_disabled");
    assert_eq!(json_response["days"][0]["slots"], json!([]));
    assert_eq!(json_response["days"][1]["slots"].as_array().unwrap().len(), 16);
}

#[tokio::test]
async fn malformed_doctor_id_is_rejected() {
    let (state, _store) = TestConfig::default().to_state();

    let request = Request::builder()
        .method("GET")
        .uri("/not-a-uuid/schedule")
        .body(Body::empty())
        .unwrap();

    let response = doctor_routes(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
