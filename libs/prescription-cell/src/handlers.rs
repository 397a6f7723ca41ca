use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use appointment_cell::AppointmentBookingService;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_models::prescription::{Prescription, PrescriptionKind};
use shared_utils::extractor::require_role;
use shared_utils::AppState;

use crate::models::{
    CancelPrescriptionRequest, CreatePrescriptionRequest, CreateRetailPrescriptionRequest,
    PrescriptionError,
};
use crate::services::{InventoryService, PrescriptionService};

// ==============================================================================
// AUTHORIZATION HELPERS
// ==============================================================================

fn acting_user_id(user: &User) -> Result<Uuid, AppError> {
    user.user_id()
        .ok_or_else(|| AppError::Auth("Invalid user id in token".to_string()))
}

/// Pharmacy staff see everything; doctors and patients only their own.
fn ensure_can_view(user: &User, role: Role, prescription: &Prescription) -> Result<(), AppError> {
    let allowed = match role {
        Role::Admin | Role::Pharmacist => true,
        Role::Doctor => prescription.doctor_id.is_some_and(|id| user.is(id)),
        Role::Patient => user.is(prescription.patient_id),
    };
    if !allowed {
        return Err(AppError::Forbidden(
            "Not authorized to access this prescription".to_string(),
        ));
    }
    Ok(())
}

// ==============================================================================
// SHARED HANDLER BODIES
// ==============================================================================

async fn get_detail(
    state: &AppState,
    user: &User,
    kind: PrescriptionKind,
    id: i64,
) -> Result<Json<Value>, AppError> {
    let role = require_role(
        user,
        &[Role::Admin, Role::Pharmacist, Role::Doctor, Role::Patient],
    )?;
    let detail = PrescriptionService::new(state).get_detail(kind, id).await?;
    ensure_can_view(user, role, &detail.prescription)?;

    Ok(Json(json!(detail)))
}

async fn prepare(
    state: &AppState,
    user: &User,
    kind: PrescriptionKind,
    id: i64,
) -> Result<Json<Value>, AppError> {
    require_role(user, &[Role::Admin, Role::Pharmacist])?;
    let pharmacist_id = acting_user_id(user)?;

    let detail = PrescriptionService::new(state)
        .mark_prepared(kind, id, pharmacist_id, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "prescription": detail.prescription,
        "total": detail.total,
        "payment": detail.payment,
        "message": "Prescription prepared and waiting for payment"
    })))
}

async fn complete(
    state: &AppState,
    user: &User,
    kind: PrescriptionKind,
    id: i64,
) -> Result<Json<Value>, AppError> {
    require_role(user, &[Role::Admin, Role::Pharmacist])?;
    let pharmacist_id = acting_user_id(user)?;

    let (prescription, dispensed) = PrescriptionService::new(state)
        .complete(kind, id, pharmacist_id, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "prescription": prescription,
        "dispensed": dispensed,
        "message": "Prescription completed"
    })))
}

async fn cancel(
    state: &AppState,
    user: &User,
    kind: PrescriptionKind,
    id: i64,
    request: CancelPrescriptionRequest,
) -> Result<Json<Value>, AppError> {
    let role = require_role(user, &[Role::Admin, Role::Pharmacist, Role::Doctor])?;
    let service = PrescriptionService::new(state);

    if role == Role::Doctor {
        let existing = service.get_prescription(kind, id).await?;
        ensure_can_view(user, role, &existing)?;
    }

    let prescription = service
        .cancel(kind, id, request.reason, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "prescription": prescription,
        "message": "Prescription cancelled"
    })))
}

// ==============================================================================
// APPOINTMENT PRESCRIPTIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_prescription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    let role = require_role(&user, &[Role::Admin, Role::Doctor])?;

    if role == Role::Doctor {
        let appointment = AppointmentBookingService::new(&state)
            .get_appointment(request.appointment_id)
            .await
            .map_err(PrescriptionError::from)?;
        if !user.is(appointment.doctor_id) {
            return Err(AppError::Forbidden(
                "Only the appointment's doctor can prescribe".to_string(),
            ));
        }
    }

    let prescription = PrescriptionService::new(&state).create(request).await?;

    Ok(Json(json!({
        "success": true,
        "prescription": prescription,
        "message": "Prescription created"
    })))
}

#[axum::debug_handler]
pub async fn get_prescription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    get_detail(&state, &user, PrescriptionKind::Appointment, id).await
}

#[axum::debug_handler]
pub async fn prepare_prescription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    prepare(&state, &user, PrescriptionKind::Appointment, id).await
}

#[axum::debug_handler]
pub async fn complete_prescription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    complete(&state, &user, PrescriptionKind::Appointment, id).await
}

#[axum::debug_handler]
pub async fn cancel_prescription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelPrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    cancel(&state, &user, PrescriptionKind::Appointment, id, request).await
}

// ==============================================================================
// RETAIL PRESCRIPTIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_retail_prescription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateRetailPrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[Role::Admin, Role::Pharmacist])?;

    let prescription = PrescriptionService::new(&state)
        .create_retail(request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "prescription": prescription,
        "message": "Retail prescription created"
    })))
}

#[axum::debug_handler]
pub async fn get_retail_prescription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    get_detail(&state, &user, PrescriptionKind::Retail, id).await
}

#[axum::debug_handler]
pub async fn prepare_retail_prescription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    prepare(&state, &user, PrescriptionKind::Retail, id).await
}

#[axum::debug_handler]
pub async fn complete_retail_prescription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    complete(&state, &user, PrescriptionKind::Retail, id).await
}

#[axum::debug_handler]
pub async fn cancel_retail_prescription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelPrescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    cancel(&state, &user, PrescriptionKind::Retail, id, request).await
}

// ==============================================================================
// STOCK
// ==============================================================================

#[axum::debug_handler]
pub async fn dispose_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[Role::Admin, Role::Pharmacist])?;

    let batch = InventoryService::new(&state).dispose_batch(batch_id).await?;

    Ok(Json(json!({
        "success": true,
        "batch": batch,
        "message": "Batch disposed"
    })))
}
