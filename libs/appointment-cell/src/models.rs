use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::{AvailabilityError, UnavailableReason};
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::schedule::DoctorDayOff;

pub use shared_models::appointment::{Appointment, AppointmentStatus, CancelledBy};
pub use shared_models::compensation::CompensationCode;

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_datetime: DateTime<Utc>,
    pub note: Option<String>,
    pub compensation_code: Option<String>,
    /// Admins book on behalf of a patient; patients always book for themselves.
    pub patient_id: Option<Uuid>,
}

/// Accepting may reassign the doctor or move the time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcceptAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub appointment_datetime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub appointment_datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDayOffRequest {
    /// Required for admins; doctors always act on their own calendar.
    pub doctor_id: Option<Uuid>,
    pub off_date: NaiveDate,
    pub morning: bool,
    pub afternoon: bool,
    pub reason: Option<String>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub appointment: Appointment,
    pub compensation_code: Option<CompensationCode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescheduleOutcome {
    pub original: Appointment,
    pub successor: Appointment,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayOffOutcome {
    pub day_off: DoctorDayOff,
    pub cancelled: Vec<CancellationOutcome>,
    /// Appointments that changed state while the cascade ran.
    pub skipped: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompensationCodeView {
    pub code: String,
    pub discount_percent: i32,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub redeemable: bool,
}

impl CompensationCodeView {
    pub fn new(code: &CompensationCode, redeemable: bool) -> Self {
        Self {
            code: code.code.clone(),
            discount_percent: code.discount_percent,
            expires_at: code.expires_at,
            is_used: code.is_used,
            redeemable,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment time has not passed yet")]
    NotDue,

    #[error("Appointment was modified concurrently")]
    ConcurrentModification,

    #[error("Appointment slot not available: {0}")]
    SlotUnavailable(UnavailableReason),

    #[error("Invalid compensation code: {0}")]
    InvalidCompensationCode(String),

    #[error("Compensation code was redeemed concurrently")]
    CompensationCodeTaken,

    #[error("Compensation code not found")]
    CompensationCodeNotFound,

    #[error("Doctor already has an active day-off on {0}")]
    DayOffConflict(NaiveDate),

    #[error("Day-off not found")]
    DayOffNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AvailabilityError> for AppointmentError {
    fn from(e: AvailabilityError) -> Self {
        match e {
            AvailabilityError::SlotUnavailable(reason) => AppointmentError::SlotUnavailable(reason),
            AvailabilityError::InvalidRange(msg) => AppointmentError::InvalidRange(msg),
            AvailabilityError::ScheduleNotFound => {
                AppointmentError::SlotUnavailable(UnavailableReason::NoSchedule)
            }
            AvailabilityError::Store(e) => AppointmentError::Store(e),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::InvalidStatusTransition { .. } | AppointmentError::NotDue => {
                AppError::BadRequest(e.to_string())
            }
            AppointmentError::ConcurrentModification
            | AppointmentError::CompensationCodeTaken
            | AppointmentError::DayOffConflict(_) => AppError::Conflict(e.to_string()),
            AppointmentError::SlotUnavailable(reason) if reason.is_contention() => {
                AppError::Conflict(e.to_string())
            }
            AppointmentError::SlotUnavailable(_)
            | AppointmentError::InvalidCompensationCode(_)
            | AppointmentError::ValidationError(_)
            | AppointmentError::InvalidRange(_) => AppError::BadRequest(e.to_string()),
            AppointmentError::CompensationCodeNotFound | AppointmentError::DayOffNotFound => {
                AppError::NotFound(e.to_string())
            }
            AppointmentError::Store(e) => e.into(),
        }
    }
}
