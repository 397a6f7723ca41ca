use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use appointment_cell::AppointmentBookingService;
use prescription_cell::PrescriptionService;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_models::payment::{CallbackFailure, PaymentKind, PaymentStatus};
use shared_models::prescription::PrescriptionKind;
use shared_utils::extractor::require_role;
use shared_utils::AppState;

use crate::models::PaymentError;
use crate::services::{parse_callback, CheckoutService, PaymentLedger};

// ==============================================================================
// AUTHORIZATION HELPERS
// ==============================================================================

async fn patient_of(state: &AppState, kind: PaymentKind, owner_id: i64) -> Result<Uuid, PaymentError> {
    match PrescriptionKind::from_payment_kind(kind) {
        None => Ok(AppointmentBookingService::new(state)
            .get_appointment(owner_id)
            .await?
            .patient_id),
        Some(prescription_kind) => Ok(PrescriptionService::new(state)
            .get_prescription(prescription_kind, owner_id)
            .await
            .map_err(|e| PaymentError::from_prescription(kind, e))?
            .patient_id),
    }
}

/// Staff act on any payment; patients only on their own.
async fn ensure_payer(
    state: &AppState,
    user: &User,
    kind: PaymentKind,
    owner_id: i64,
) -> Result<(), AppError> {
    let role = require_role(user, &[Role::Admin, Role::Pharmacist, Role::Patient])?;
    if role == Role::Patient && !user.is(patient_of(state, kind, owner_id).await?) {
        return Err(AppError::Forbidden(
            "Not authorized to access this payment".to_string(),
        ));
    }
    Ok(())
}

// ==============================================================================
// SHARED HANDLER BODIES
// ==============================================================================

async fn checkout(
    state: &AppState,
    user: &User,
    kind: PaymentKind,
    owner_id: i64,
) -> Result<Json<Value>, AppError> {
    ensure_payer(state, user, kind, owner_id).await?;

    let response = CheckoutService::new(state)?
        .create_payment(kind, owner_id, Utc::now())
        .await?;

    Ok(Json(json!(response)))
}

async fn status(
    state: &AppState,
    user: &User,
    kind: PaymentKind,
    owner_id: i64,
) -> Result<(StatusCode, Json<Value>), AppError> {
    ensure_payer(state, user, kind, owner_id).await?;

    let payment = PaymentLedger::new(state)
        .payment_status(kind, owner_id)
        .await?;
    let code = if payment.status == PaymentStatus::Pending {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((
        code,
        Json(json!({
            "success": true,
            "status": payment.status,
            "payment": payment
        })),
    ))
}

/// The gateway only learns that the notification arrived. Anything that
/// could not be applied is logged and kept for follow-up.
async fn callback(state: &AppState, kind: PaymentKind, owner_id: i64, body: Bytes) -> Json<Value> {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => Value::String(String::from_utf8_lossy(&body).into_owned()),
    };

    let result = match parse_callback(&state.config.payment, kind, owner_id, &payload) {
        Ok(settlement) => {
            PaymentLedger::new(state)
                .settle(kind, owner_id, settlement, Utc::now())
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => {
            info!(
                "Callback for {} {} processed: payment {} is {}",
                kind,
                owner_id,
                outcome.payment().id,
                outcome.payment().status
            );
            Json(json!({ "message": "Processed" }))
        }
        Err(e) => {
            warn!("Callback for {} {} not applied: {}", kind, owner_id, e);
            let failure = CallbackFailure {
                kind,
                owner_id,
                order_id: payload
                    .get("orderId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                reason: e.to_string(),
                payload,
            };
            if let Err(store_error) = state.store.record_callback_failure(failure).await {
                error!("Failed to record callback failure for {} {}: {}", kind, owner_id, store_error);
            }
            Json(json!({ "message": "Processed with error" }))
        }
    }
}

async fn cash(
    state: &AppState,
    user: &User,
    kind: PrescriptionKind,
    prescription_id: i64,
) -> Result<Json<Value>, AppError> {
    require_role(user, &[Role::Admin, Role::Pharmacist])?;

    let payment = PaymentLedger::new(state)
        .record_cash_payment(kind, prescription_id, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "payment": payment,
        "message": "Cash payment recorded"
    })))
}

// ==============================================================================
// APPOINTMENT PAYMENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment_payment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    checkout(&state, &user, PaymentKind::Appointment, appointment_id).await
}

#[axum::debug_handler]
pub async fn appointment_payment_callback(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    body: Bytes,
) -> Json<Value> {
    callback(&state, PaymentKind::Appointment, appointment_id, body).await
}

#[axum::debug_handler]
pub async fn appointment_payment_status(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    status(&state, &user, PaymentKind::Appointment, appointment_id).await
}

// ==============================================================================
// PRESCRIPTION PAYMENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_prescription_payment(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    checkout(&state, &user, PaymentKind::Prescription, prescription_id).await
}

#[axum::debug_handler]
pub async fn prescription_payment_callback(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    body: Bytes,
) -> Json<Value> {
    callback(&state, PaymentKind::Prescription, prescription_id, body).await
}

#[axum::debug_handler]
pub async fn prescription_payment_status(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    status(&state, &user, PaymentKind::Prescription, prescription_id).await
}

#[axum::debug_handler]
pub async fn prescription_cash_payment(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    cash(&state, &user, PrescriptionKind::Appointment, prescription_id).await
}

// ==============================================================================
// RETAIL PRESCRIPTION PAYMENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_retail_prescription_payment(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    checkout(&state, &user, PaymentKind::RetailPrescription, prescription_id).await
}

#[axum::debug_handler]
pub async fn retail_prescription_payment_callback(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    body: Bytes,
) -> Json<Value> {
    callback(&state, PaymentKind::RetailPrescription, prescription_id, body).await
}

#[axum::debug_handler]
pub async fn retail_prescription_payment_status(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    status(&state, &user, PaymentKind::RetailPrescription, prescription_id).await
}

#[axum::debug_handler]
pub async fn retail_prescription_cash_payment(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    cash(&state, &user, PrescriptionKind::Retail, prescription_id).await
}
