use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use shared_models::{
    appointment::{Appointment, AppointmentPatch, AppointmentStatus, NewAppointment},
    compensation::{CompensationCode, NewCompensationCode},
    error::AppError,
    inventory::{Batch, BatchStatus},
    payment::{CallbackFailure, NewPayment, Payment, PaymentKind, PaymentPatch, PaymentStatus},
    prescription::{
        NewPrescription, Prescription, PrescriptionKind, PrescriptionMedicine, PrescriptionPatch,
        PrescriptionStatus,
    },
    schedule::{DoctorDayOff, NewDayOff, Schedule},
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// Unique constraint violation or a competing write.
    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("database rejected credentials: {0}")]
    Unauthorized(String),

    #[error("database request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("failed to decode database response: {0}")]
    Decode(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            other => AppError::Database(other.to_string()),
        }
    }
}

// ==============================================================================
// PORTS
// ==============================================================================
//
// Every `transition_*`/`update_*` method is a conditional write: it only
// applies when the row still has the `expected` status and returns `None`
// when it does not.

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_appointment(&self, id: i64) -> StoreResult<Option<Appointment>>;

    /// Appointments of one doctor with `from <= datetime < to` in any of `statuses`.
    async fn appointments_for_doctor_between(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        statuses: &[AppointmentStatus],
    ) -> StoreResult<Vec<Appointment>>;

    /// Fails with `Conflict` when the doctor already has a slot-blocking
    /// appointment at the same instant.
    async fn insert_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment>;

    async fn transition_appointment(
        &self,
        id: i64,
        expected: AppointmentStatus,
        patch: AppointmentPatch,
    ) -> StoreResult<Option<Appointment>>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn get_schedule(&self, doctor_id: Uuid) -> StoreResult<Option<Schedule>>;

    async fn upsert_schedule(&self, schedule: Schedule) -> StoreResult<Schedule>;

    /// Day-offs of every status with `from <= off_date <= to`.
    async fn day_offs_for_doctor(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DoctorDayOff>>;

    async fn get_day_off(&self, id: i64) -> StoreResult<Option<DoctorDayOff>>;

    /// Fails with `Conflict` when an active day-off already exists on that date.
    async fn insert_day_off(&self, day_off: NewDayOff) -> StoreResult<DoctorDayOff>;

    /// Moves an active day-off to cancelled.
    async fn cancel_day_off(&self, id: i64) -> StoreResult<Option<DoctorDayOff>>;
}

#[async_trait]
pub trait CompensationStore: Send + Sync {
    /// Fails with `Conflict` when the source appointment already has a code
    /// or the code string is taken.
    async fn insert_compensation_code(
        &self,
        code: NewCompensationCode,
    ) -> StoreResult<CompensationCode>;

    async fn find_compensation_code(&self, code: &str) -> StoreResult<Option<CompensationCode>>;

    async fn compensation_code_for_appointment(
        &self,
        source_appointment_id: i64,
    ) -> StoreResult<Option<CompensationCode>>;

    /// Marks an unused code as used. `None` when it was already used.
    async fn redeem_compensation_code(
        &self,
        id: i64,
        used_appointment_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<CompensationCode>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// All attempts for one owner, newest first.
    async fn payments_for(&self, kind: PaymentKind, owner_id: i64) -> StoreResult<Vec<Payment>>;

    /// Fails with `Conflict` when inserting a second `paid` row for the owner.
    async fn insert_payment(&self, kind: PaymentKind, payment: NewPayment) -> StoreResult<Payment>;

    async fn update_payment(
        &self,
        kind: PaymentKind,
        id: i64,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> StoreResult<Option<Payment>>;

    async fn record_callback_failure(&self, failure: CallbackFailure) -> StoreResult<()>;
}

#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    async fn get_prescription(
        &self,
        kind: PrescriptionKind,
        id: i64,
    ) -> StoreResult<Option<Prescription>>;

    async fn prescription_for_appointment(
        &self,
        appointment_id: i64,
    ) -> StoreResult<Option<Prescription>>;

    /// Inserts the prescription and its medicines. Fails with `Conflict` when
    /// the appointment already has a prescription.
    async fn insert_prescription(
        &self,
        kind: PrescriptionKind,
        prescription: NewPrescription,
    ) -> StoreResult<Prescription>;

    async fn prescription_medicines(
        &self,
        kind: PrescriptionKind,
        id: i64,
    ) -> StoreResult<Vec<PrescriptionMedicine>>;

    async fn transition_prescription(
        &self,
        kind: PrescriptionKind,
        id: i64,
        expected: PrescriptionStatus,
        patch: PrescriptionPatch,
    ) -> StoreResult<Option<Prescription>>;

    /// Cancels every `pending_prepare` prescription created before
    /// `created_before`. Returns how many rows changed.
    async fn cancel_stale_prescriptions(
        &self,
        kind: PrescriptionKind,
        created_before: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_batch(&self, id: i64) -> StoreResult<Option<Batch>>;

    /// Active, unexpired, non-empty batches of a medicine, earliest expiry first.
    async fn dispensable_batches(&self, medicine_id: i64, today: NaiveDate)
        -> StoreResult<Vec<Batch>>;

    /// Sets the quantity only if it still equals `expected_quantity`.
    async fn adjust_batch_quantity(
        &self,
        id: i64,
        expected_quantity: i32,
        new_quantity: i32,
    ) -> StoreResult<Option<Batch>>;

    async fn set_batch_status(
        &self,
        id: i64,
        expected: BatchStatus,
        status: BatchStatus,
    ) -> StoreResult<Option<Batch>>;

    /// Marks every Active batch with `expiry_date < today` Expired.
    async fn expire_batches(&self, today: NaiveDate) -> StoreResult<u64>;
}

/// Everything the clinic services persist.
pub trait ClinicStore:
    AppointmentStore + ScheduleStore + CompensationStore + PaymentStore + PrescriptionStore + InventoryStore
{
}

impl<T> ClinicStore for T where
    T: AppointmentStore
        + ScheduleStore
        + CompensationStore
        + PaymentStore
        + PrescriptionStore
        + InventoryStore
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn store_errors_map_to_http_taxonomy() {
        assert_matches!(
            AppError::from(StoreError::Conflict("dup".into())),
            AppError::Conflict(_)
        );
        assert_matches!(
            AppError::from(StoreError::Unavailable("down".into())),
            AppError::ServiceUnavailable(_)
        );
        assert_matches!(
            AppError::from(StoreError::Decode("bad".into())),
            AppError::Database(_)
        );
    }
}
