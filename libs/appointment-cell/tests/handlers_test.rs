use assert_matches::assert_matches;
use axum::extract::{Extension, Path, State};
use axum::Json;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::handlers::*;
use appointment_cell::models::{
    AcceptAppointmentRequest, BookAppointmentRequest, CancelAppointmentRequest, CreateDayOffRequest,
};
use shared_config::ClinicHours;
use shared_database::store::{AppointmentStore, ScheduleStore};
use shared_models::appointment::{AppointmentStatus, CancelledBy};
use shared_models::{auth::User, error::AppError, schedule::Schedule};
use shared_utils::test_utils::{Fixtures, TestConfig, TestUser};

fn user_extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

fn next_monday() -> NaiveDate {
    let start = Utc::now().date_naive() + Duration::days(14);
    start + Duration::days(7 - i64::from(start.weekday().num_days_from_monday()))
}

fn slot(h: u32, m: u32) -> DateTime<Utc> {
    ClinicHours::default().to_utc(next_monday(), NaiveTime::from_hms_opt(h, m, 0).unwrap())
}

fn booking(doctor_id: Uuid, patient_id: Option<Uuid>) -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id,
        appointment_datetime: slot(9, 0),
        note: None,
        compensation_code: None,
        patient_id,
    }
}

#[tokio::test]
async fn patient_cannot_book_for_someone_else() {
    let (state, store) = TestConfig::default().to_state();
    let doctor = Uuid::new_v4();
    store.upsert_schedule(Schedule::weekdays(doctor)).await.unwrap();
    let patient = TestUser::patient("pat@example.com");

    let result = book_appointment(
        State(state),
        user_extension(&patient),
        Json(booking(doctor, Some(Uuid::new_v4()))),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn admin_books_on_behalf_of_patient() {
    let (state, store) = TestConfig::default().to_state();
    let doctor = Uuid::new_v4();
    let patient = Uuid::new_v4();
    store.upsert_schedule(Schedule::weekdays(doctor)).await.unwrap();
    let admin = TestUser::admin("admin@example.com");

    let missing_patient = book_appointment(
        State(state.clone()),
        user_extension(&admin),
        Json(booking(doctor, None)),
    )
    .await;
    assert_matches!(missing_patient, Err(AppError::BadRequest(_)));

    let result = book_appointment(
        State(state),
        user_extension(&admin),
        Json(booking(doctor, Some(patient))),
    )
    .await
    .unwrap();
    assert_eq!(result.0["appointment"]["patient_id"], patient.to_string());
}

#[tokio::test]
async fn pharmacists_cannot_book() {
    let (state, _store) = TestConfig::default().to_state();
    let pharmacist = TestUser::pharmacist("ph@example.com");

    let result = book_appointment(
        State(state),
        user_extension(&pharmacist),
        Json(booking(Uuid::new_v4(), None)),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn only_the_assigned_doctor_accepts() {
    let (state, store) = TestConfig::default().to_state();
    let doctor = TestUser::doctor("doc@example.com");
    let colleague = TestUser::doctor("other@example.com");
    let patient = TestUser::patient("pat@example.com");
    store.upsert_schedule(Schedule::weekdays(doctor.uuid())).await.unwrap();
    store
        .seed_appointment(Fixtures::appointment(
            1,
            patient.uuid(),
            doctor.uuid(),
            slot(9, 0),
            AppointmentStatus::WaitingForConfirmation,
        ))
        .await;

    let by_patient = accept_appointment(State(state.clone()), Path(1), user_extension(&patient), None).await;
    assert_matches!(by_patient, Err(AppError::Forbidden(_)));

    let by_colleague =
        accept_appointment(State(state.clone()), Path(1), user_extension(&colleague), None).await;
    assert_matches!(by_colleague, Err(AppError::Forbidden(_)));

    let reassign = AcceptAppointmentRequest {
        doctor_id: Some(colleague.uuid()),
        appointment_datetime: None,
    };
    let handing_over = accept_appointment(
        State(state.clone()),
        Path(1),
        user_extension(&doctor),
        Some(Json(reassign)),
    )
    .await;
    assert_matches!(handing_over, Err(AppError::Forbidden(_)));

    let accepted = accept_appointment(State(state), Path(1), user_extension(&doctor), None)
        .await
        .unwrap();
    assert_eq!(accepted.0["appointment"]["status"], "accepted");
}

#[tokio::test]
async fn accepting_twice_is_a_bad_request() {
    let (state, store) = TestConfig::default().to_state();
    let doctor = TestUser::doctor("doc@example.com");
    store
        .seed_appointment(Fixtures::appointment(
            2,
            Uuid::new_v4(),
            doctor.uuid(),
            slot(9, 0),
            AppointmentStatus::Accepted,
        ))
        .await;

    let result = accept_appointment(State(state), Path(2), user_extension(&doctor), None).await;
    assert_matches!(result, Err(AppError::BadRequest(_)));
}

#[tokio::test]
async fn admin_cancellation_of_accepted_appointment_returns_code() {
    let (state, store) = TestConfig::default().to_state();
    let admin = TestUser::admin("admin@example.com");
    let patient = Uuid::new_v4();
    store
        .seed_appointment(Fixtures::appointment(
            3,
            patient,
            Uuid::new_v4(),
            slot(9, 0),
            AppointmentStatus::Accepted,
        ))
        .await;

    let result = cancel_appointment(
        State(state),
        Path(3),
        user_extension(&admin),
        Json(CancelAppointmentRequest {
            reason: Some("clinic closed".to_string()),
        }),
    )
    .await
    .unwrap();

    assert_eq!(result.0["appointment"]["cancelled_by"], "admin");
    assert_eq!(result.0["compensation_code"]["patient_id"], patient.to_string());

    let stored = store.get_appointment(3).await.unwrap().unwrap();
    assert_eq!(stored.cancelled_by, Some(CancelledBy::Admin));
}

#[tokio::test]
async fn pharmacist_cannot_cancel_appointments() {
    let (state, store) = TestConfig::default().to_state();
    let pharmacist = TestUser::pharmacist("pharm@example.com");
    store
        .seed_appointment(Fixtures::appointment(
            5,
            Uuid::new_v4(),
            Uuid::new_v4(),
            slot(9, 0),
            AppointmentStatus::Accepted,
        ))
        .await;

    let result = cancel_appointment(
        State(state),
        Path(5),
        user_extension(&pharmacist),
        Json(CancelAppointmentRequest {
            reason: Some("out of stock".to_string()),
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
    let stored = store.get_appointment(5).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Accepted);
}

#[tokio::test]
async fn admin_recancel_returns_the_issued_code() {
    let (state, store) = TestConfig::default().to_state();
    let admin = TestUser::admin("admin@example.com");
    store
        .seed_appointment(Fixtures::appointment(
            6,
            Uuid::new_v4(),
            Uuid::new_v4(),
            slot(9, 0),
            AppointmentStatus::Accepted,
        ))
        .await;
    let request = || {
        Json(CancelAppointmentRequest {
            reason: Some("clinic closed".to_string()),
        })
    };

    let first = cancel_appointment(State(state.clone()), Path(6), user_extension(&admin), request())
        .await
        .unwrap();
    let second = cancel_appointment(State(state), Path(6), user_extension(&admin), request())
        .await
        .unwrap();

    assert_eq!(first.0["compensation_code"]["code"], second.0["compensation_code"]["code"]);
    assert_eq!(second.0["appointment"]["status"], "cancelled");
}

#[tokio::test]
async fn unknown_appointment_is_not_found() {
    let (state, _store) = TestConfig::default().to_state();
    let admin = TestUser::admin("admin@example.com");

    let result = get_appointment(State(state), Path(999), user_extension(&admin)).await;
    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn patients_cannot_see_foreign_compensation_codes() {
    let (state, store) = TestConfig::default().to_state();
    let admin = TestUser::admin("admin@example.com");
    let owner = TestUser::patient("owner@example.com");
    let stranger = TestUser::patient("stranger@example.com");
    store
        .seed_appointment(Fixtures::appointment(
            4,
            owner.uuid(),
            Uuid::new_v4(),
            slot(9, 0),
            AppointmentStatus::Accepted,
        ))
        .await;

    let cancelled = cancel_appointment(
        State(state.clone()),
        Path(4),
        user_extension(&admin),
        Json(CancelAppointmentRequest {
            reason: Some("doctor ill".to_string()),
        }),
    )
    .await
    .unwrap();
    let code = cancelled.0["compensation_code"]["code"].as_str().unwrap().to_string();

    let foreign = get_compensation_code(State(state.clone()), Path(code.clone()), user_extension(&stranger)).await;
    assert_matches!(foreign, Err(AppError::NotFound(_)));

    let own = get_compensation_code(State(state), Path(code), user_extension(&owner))
        .await
        .unwrap();
    assert_eq!(own.0["redeemable"], true);
}

#[tokio::test]
async fn doctors_manage_only_their_own_day_offs() {
    let (state, _store) = TestConfig::default().to_state();
    let doctor = TestUser::doctor("doc@example.com");
    let colleague = TestUser::doctor("other@example.com");

    let request = |doctor_id: Option<Uuid>| CreateDayOffRequest {
        doctor_id,
        off_date: next_monday(),
        morning: true,
        afternoon: false,
        reason: None,
    };

    let foreign = create_day_off(
        State(state.clone()),
        user_extension(&doctor),
        Json(request(Some(colleague.uuid()))),
    )
    .await;
    assert_matches!(foreign, Err(AppError::Forbidden(_)));

    let created = create_day_off(State(state.clone()), user_extension(&doctor), Json(request(None)))
        .await
        .unwrap();
    let id = created.0["day_off"]["id"].as_i64().unwrap();

    let by_colleague = cancel_day_off(State(state.clone()), Path(id), user_extension(&colleague)).await;
    assert_matches!(by_colleague, Err(AppError::Forbidden(_)));

    let restored = cancel_day_off(State(state), Path(id), user_extension(&doctor))
        .await
        .unwrap();
    assert_eq!(restored.0["day_off"]["status"], "cancelled");
}
