use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use assert_matches::assert_matches;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use doctor_cell::handlers::*;
use doctor_cell::models::{DateRangeQuery, UpdateScheduleRequest};
use shared_database::store::ScheduleStore;
use shared_models::{auth::User, error::AppError, schedule::NewDayOff};
use shared_utils::test_utils::{TestConfig, TestUser};

fn user_extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

fn weekdays_only() -> UpdateScheduleRequest {
    UpdateScheduleRequest {
        monday: true,
        tuesday: true,
        wednesday: true,
        thursday: true,
        friday: true,
        saturday: false,
        sunday: false,
    }
}

fn next_monday() -> NaiveDate {
    let start = Utc::now().date_naive() + Duration::days(14);
    start + Duration::days(7 - i64::from(start.weekday().num_days_from_monday()))
}

#[tokio::test]
async fn doctor_updates_own_schedule() {
    let (state, _store) = TestConfig::default().to_state();
    let doctor = TestUser::doctor("doc@example.com");

    let result = update_schedule(
        State(state.clone()),
        Path(doctor.uuid()),
        user_extension(&doctor),
        Json(weekdays_only()),
    )
    .await
    .unwrap();

    assert_eq!(result.0["monday"], true);
    assert_eq!(result.0["saturday"], false);

    let fetched = get_schedule(State(state), Path(doctor.uuid())).await.unwrap();
    assert_eq!(fetched.0["doctor_id"], doctor.id);
}

#[tokio::test]
async fn doctor_cannot_update_colleague_schedule() {
    let (state, _store) = TestConfig::default().to_state();
    let doctor = TestUser::doctor("doc@example.com");

    let result = update_schedule(
        State(state),
        Path(Uuid::new_v4()),
        user_extension(&doctor),
        Json(weekdays_only()),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn patient_cannot_update_schedules() {
    let (state, _store) = TestConfig::default().to_state();
    let patient = TestUser::patient("patient@example.com");

    let result = update_schedule(
        State(state),
        Path(patient.uuid()),
        user_extension(&patient),
        Json(weekdays_only()),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn missing_schedule_is_not_found() {
    let (state, _store) = TestConfig::default().to_state();

    let result = get_schedule(State(state), Path(Uuid::new_v4())).await;

    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn slots_reflect_partial_day_off() {
    let (state, store) = TestConfig::default().to_state();
    let admin = TestUser::admin("admin@example.com");
    let doctor_id = Uuid::new_v4();
    let monday = next_monday();

    update_schedule(
        State(state.clone()),
        Path(doctor_id),
        user_extension(&admin),
        Json(weekdays_only()),
    )
    .await
    .unwrap();

    store
        .insert_day_off(NewDayOff {
            doctor_id,
            off_date: monday,
            morning: false,
            afternoon: true,
            reason: Some("training".into()),
        })
        .await
        .unwrap();

    let result = get_available_slots(
        State(state.clone()),
        Path(doctor_id),
        Query(DateRangeQuery {
            from: Some(monday),
            to: Some(monday + Duration::days(1)),
        }),
    )
    .await
    .unwrap();

    let days = result.0["days"].as_array().unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0]["slots"].as_array().unwrap().len(), 8);
    assert_eq!(days[1]["slots"].as_array().unwrap().len(), 16);
    assert_eq!(result.0["total_slots"], 24);

    let day_offs = get_day_offs(
        State(state),
        Path(doctor_id),
        Query(DateRangeQuery {
            from: Some(monday),
            to: Some(monday),
        }),
    )
    .await
    .unwrap();
    assert_eq!(day_offs.0["total"], 1);
}

#[tokio::test]
async fn slot_range_is_capped() {
    let (state, _store) = TestConfig::default().to_state();
    let monday = next_monday();

    let result = get_available_slots(
        State(state),
        Path(Uuid::new_v4()),
        Query(DateRangeQuery {
            from: Some(monday),
            to: Some(monday + Duration::days(60)),
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
}
