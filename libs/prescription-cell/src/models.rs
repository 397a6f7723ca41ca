use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::AppointmentError;
use shared_database::StoreError;
use shared_models::appointment::AppointmentStatus;
use shared_models::error::AppError;
use shared_models::inventory::BatchStatus;
use shared_models::payment::Payment;
use shared_models::prescription::{
    NewPrescriptionMedicine, Prescription, PrescriptionMedicine, PrescriptionStatus,
};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub appointment_id: i64,
    pub note: Option<String>,
    pub medicines: Vec<NewPrescriptionMedicine>,
}

/// Walk-in sale; not tied to an appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRetailPrescriptionRequest {
    pub patient_id: Uuid,
    pub note: Option<String>,
    pub medicines: Vec<NewPrescriptionMedicine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelPrescriptionRequest {
    pub reason: Option<String>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionDetail {
    pub prescription: Prescription,
    pub medicines: Vec<PrescriptionMedicine>,
    pub total: i64,
    /// Current payment sub-record, if one was created.
    pub payment: Option<Payment>,
}

/// Units taken from one batch when a prescription is dispensed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DispenseLine {
    pub batch_id: i64,
    pub medicine_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_batches: u64,
    pub cancelled_prescriptions: u64,
    pub cancelled_retail_prescriptions: u64,
    pub failures: Vec<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum PrescriptionError {
    #[error("Prescription not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Appointment is {0}; prescriptions require a completed appointment")]
    AppointmentNotCompleted(AppointmentStatus),

    #[error("Appointment {0} already has a prescription")]
    AlreadyPrescribed(i64),

    #[error("Cannot move prescription from {from} to {to}")]
    InvalidStatusTransition {
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },

    #[error("Prescription has not been paid")]
    NotPaid,

    #[error("Insufficient stock for medicine {medicine_id}: requested {requested}, available {available}")]
    InsufficientStock {
        medicine_id: i64,
        requested: i32,
        available: i32,
    },

    #[error("Batch not found")]
    BatchNotFound,

    #[error("Batch is already {0}")]
    BatchNotDisposable(BatchStatus),

    #[error("Prescription was modified concurrently")]
    ConcurrentModification,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AppointmentError> for PrescriptionError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => PrescriptionError::AppointmentNotFound,
            AppointmentError::Store(e) => PrescriptionError::Store(e),
            other => PrescriptionError::ValidationError(other.to_string()),
        }
    }
}

impl From<PrescriptionError> for AppError {
    fn from(e: PrescriptionError) -> Self {
        match e {
            PrescriptionError::NotFound
            | PrescriptionError::AppointmentNotFound
            | PrescriptionError::BatchNotFound => AppError::NotFound(e.to_string()),
            PrescriptionError::AlreadyPrescribed(_) | PrescriptionError::ConcurrentModification => {
                AppError::Conflict(e.to_string())
            }
            PrescriptionError::AppointmentNotCompleted(_)
            | PrescriptionError::InvalidStatusTransition { .. }
            | PrescriptionError::NotPaid
            | PrescriptionError::InsufficientStock { .. }
            | PrescriptionError::BatchNotDisposable(_)
            | PrescriptionError::ValidationError(_) => AppError::BadRequest(e.to_string()),
            PrescriptionError::Store(e) => e.into(),
        }
    }
}
