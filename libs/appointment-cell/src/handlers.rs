use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::appointment::{Appointment, CancelledBy};
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;
use shared_utils::AppState;

use crate::models::{
    AcceptAppointmentRequest, BookAppointmentRequest, CancelAppointmentRequest,
    CompensationCodeView, CreateDayOffRequest, RescheduleAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::compensation::CompensationService;
use crate::services::day_off::DayOffService;
use crate::services::transitions::AppointmentTransitionService;

// ==============================================================================
// AUTHORIZATION HELPERS
// ==============================================================================

fn actor_of(role: Role) -> Result<CancelledBy, AppError> {
    match role {
        Role::Admin => Ok(CancelledBy::Admin),
        Role::Doctor => Ok(CancelledBy::Doctor),
        Role::Patient => Ok(CancelledBy::Patient),
        Role::Pharmacist => Err(AppError::Forbidden(
            "Pharmacists cannot cancel appointments".to_string(),
        )),
    }
}

/// Admins see every appointment; doctors and patients only their own.
fn ensure_participant(user: &User, role: Role, appointment: &Appointment) -> Result<(), AppError> {
    let allowed = match role {
        Role::Admin => true,
        Role::Doctor => user.is(appointment.doctor_id),
        Role::Patient => user.is(appointment.patient_id),
        Role::Pharmacist => false,
    };

    if !allowed {
        return Err(AppError::Forbidden(
            "Not authorized to act on this appointment".to_string(),
        ));
    }
    Ok(())
}

async fn load_for(
    state: &AppState,
    user: &User,
    appointment_id: i64,
    roles: &[Role],
) -> Result<(Role, Appointment), AppError> {
    let role = require_role(user, roles)?;
    let appointment = AppointmentBookingService::new(state)
        .get_appointment(appointment_id)
        .await?;
    ensure_participant(user, role, &appointment)?;
    Ok((role, appointment))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let role = require_role(&user, &[Role::Patient, Role::Admin])?;

    let patient_id = match role {
        Role::Admin => request.patient_id.ok_or_else(|| {
            AppError::BadRequest("patient_id is required when booking for a patient".to_string())
        })?,
        _ => {
            let own_id = user
                .user_id()
                .ok_or_else(|| AppError::Auth("Invalid user id in token".to_string()))?;
            if request.patient_id.is_some_and(|id| id != own_id) {
                return Err(AppError::Forbidden(
                    "Patients can only book appointments for themselves".to_string(),
                ));
            }
            own_id
        }
    };

    let appointment = AppointmentBookingService::new(&state)
        .book(patient_id, request, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked and waiting for confirmation"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let (_, appointment) = load_for(
        &state,
        &user,
        appointment_id,
        &[Role::Admin, Role::Doctor, Role::Patient],
    )
    .await?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// STATE MACHINE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn accept_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<User>,
    body: Option<Json<AcceptAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let (role, _) = load_for(&state, &user, appointment_id, &[Role::Admin, Role::Doctor]).await?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    if role == Role::Doctor && request.doctor_id.is_some_and(|id| !user.is(id)) {
        return Err(AppError::Forbidden(
            "Only admins can reassign an appointment to another doctor".to_string(),
        ));
    }

    let appointment = AppointmentTransitionService::new(&state)
        .accept(appointment_id, request, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment accepted"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let (role, _) = load_for(
        &state,
        &user,
        appointment_id,
        &[Role::Admin, Role::Doctor, Role::Patient],
    )
    .await?;

    let outcome = AppointmentTransitionService::new(&state)
        .cancel(appointment_id, actor_of(role)?, request.reason, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "compensation_code": outcome.compensation_code,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    load_for(&state, &user, appointment_id, &[Role::Admin, Role::Doctor]).await?;

    let appointment = AppointmentTransitionService::new(&state)
        .complete(appointment_id, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment completed"
    })))
}

#[axum::debug_handler]
pub async fn mark_not_coming(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    load_for(&state, &user, appointment_id, &[Role::Admin, Role::Doctor]).await?;

    let appointment = AppointmentTransitionService::new(&state)
        .mark_not_coming(appointment_id, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment marked as patient not coming"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    load_for(
        &state,
        &user,
        appointment_id,
        &[Role::Admin, Role::Doctor, Role::Patient],
    )
    .await?;

    let outcome = AppointmentTransitionService::new(&state)
        .reschedule(appointment_id, request.appointment_datetime, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "original": outcome.original,
        "appointment": outcome.successor,
        "message": "Appointment rescheduled"
    })))
}

// ==============================================================================
// COMPENSATION CODES
// ==============================================================================

#[axum::debug_handler]
pub async fn get_compensation_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let role = require_role(&user, &[Role::Admin, Role::Patient])?;
    let found = CompensationService::new(&state).lookup(&code).await?;

    // Other patients' codes are indistinguishable from unknown ones.
    if role == Role::Patient && !user.is(found.patient_id) {
        return Err(AppError::NotFound("Compensation code not found".to_string()));
    }

    let redeemable = found.is_redeemable(found.patient_id, Utc::now());
    Ok(Json(json!(CompensationCodeView::new(&found, redeemable))))
}

// ==============================================================================
// DOCTOR DAY-OFFS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_day_off(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDayOffRequest>,
) -> Result<Json<Value>, AppError> {
    let role = require_role(&user, &[Role::Admin, Role::Doctor])?;

    let doctor_id: Uuid = match role {
        Role::Doctor => {
            let own_id = user
                .user_id()
                .ok_or_else(|| AppError::Auth("Invalid user id in token".to_string()))?;
            if request.doctor_id.is_some_and(|id| id != own_id) {
                return Err(AppError::Forbidden(
                    "Doctors can only manage their own day-offs".to_string(),
                ));
            }
            own_id
        }
        _ => request
            .doctor_id
            .ok_or_else(|| AppError::BadRequest("doctor_id is required".to_string()))?,
    };

    let outcome = DayOffService::new(&state)
        .create_day_off(doctor_id, request, Utc::now())
        .await?;

    let cancelled: Vec<Value> = outcome
        .cancelled
        .iter()
        .map(|c| {
            json!({
                "appointment_id": c.appointment.id,
                "patient_id": c.appointment.patient_id,
                "compensation_code": c.compensation_code.as_ref().map(|code| code.code.clone()),
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "day_off": outcome.day_off,
        "cancelled_appointments": cancelled,
        "skipped_appointments": outcome.skipped,
        "message": format!("Day-off created; {} appointments cancelled", outcome.cancelled.len())
    })))
}

#[axum::debug_handler]
pub async fn cancel_day_off(
    State(state): State<Arc<AppState>>,
    Path(day_off_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let role = require_role(&user, &[Role::Admin, Role::Doctor])?;
    let service = DayOffService::new(&state);

    let existing = service.get_day_off(day_off_id).await?;
    if role == Role::Doctor && !user.is(existing.doctor_id) {
        return Err(AppError::Forbidden(
            "Doctors can only manage their own day-offs".to_string(),
        ));
    }

    let day_off = service.cancel_day_off(day_off_id).await?;

    Ok(Json(json!({
        "success": true,
        "day_off": day_off,
        "message": "Day-off cancelled"
    })))
}
