use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::{session_of, AvailabilityService, UnavailableReason};
use shared_config::ClinicHours;
use shared_database::store::AppointmentStore;
use shared_database::{ClinicStore, StoreError};
use shared_models::appointment::{
    Appointment, AppointmentPatch, AppointmentStatus, CancelledBy, NewAppointment,
};
use shared_models::schedule::Session;
use shared_utils::AppState;

use crate::models::{AcceptAppointmentRequest, AppointmentError, CancellationOutcome, RescheduleOutcome};
use crate::services::compensation::CompensationService;
use crate::services::lifecycle::AppointmentLifecycleService;

/// Drives appointments through their status graph. Every write is
/// conditional on the status read just before it.
pub struct AppointmentTransitionService {
    store: Arc<dyn ClinicStore>,
    hours: ClinicHours,
    availability: AvailabilityService,
    compensation: CompensationService,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentTransitionService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            hours: state.config.clinic.clone(),
            availability: AvailabilityService::new(state),
            compensation: CompensationService::new(state),
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    async fn load(&self, id: i64) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    /// Conditional write on the observed status. A slot collision raised by
    /// the store is reported as a taken slot.
    async fn apply(
        &self,
        observed: &Appointment,
        patch: AppointmentPatch,
    ) -> Result<Appointment, AppointmentError> {
        match self
            .store
            .transition_appointment(observed.id, observed.status, patch)
            .await
        {
            Ok(Some(updated)) => Ok(updated),
            Ok(None) => {
                warn!(
                    "Appointment {} left status {} before the write",
                    observed.id, observed.status
                );
                Err(AppointmentError::ConcurrentModification)
            }
            Err(StoreError::Conflict(msg)) => {
                warn!("Slot collision while updating appointment {}: {}", observed.id, msg);
                Err(AppointmentError::SlotUnavailable(UnavailableReason::SlotTaken))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ==========================================================================
    // ACCEPT
    // ==========================================================================

    #[instrument(skip(self, request))]
    pub async fn accept(
        &self,
        id: i64,
        request: AcceptAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(id).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Accepted)?;

        let doctor_id = request.doctor_id.unwrap_or(appointment.doctor_id);
        let datetime = request
            .appointment_datetime
            .unwrap_or(appointment.appointment_datetime);
        let moved = doctor_id != appointment.doctor_id || datetime != appointment.appointment_datetime;

        if moved {
            debug!(
                "Accepting appointment {} with reassignment to doctor {} at {}",
                id, doctor_id, datetime
            );
            self.availability
                .ensure_bookable(doctor_id, datetime, Some(id), now)
                .await?;
        }

        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::Accepted),
            accepted_at: Some(now),
            doctor_id: moved.then_some(doctor_id),
            appointment_datetime: moved.then_some(datetime),
            ..Default::default()
        };
        let accepted = self.apply(&appointment, patch).await?;

        info!("Appointment {} accepted by doctor {}", id, accepted.doctor_id);
        Ok(accepted)
    }

    // ==========================================================================
    // CANCEL
    // ==========================================================================

    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        id: i64,
        cancelled_by: CancelledBy,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CancellationOutcome, AppointmentError> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                AppointmentError::ValidationError("a cancellation reason is required".to_string())
            })?;

        let appointment = self.load(id).await?;
        if cancelled_by.is_clinic_side() && self.lifecycle.compensation_owed(&appointment) {
            return self.reissue_compensation(appointment, now).await;
        }

        self.cancel_observed(&appointment, cancelled_by, reason, now)
            .await
    }

    /// Cancelling an already withdrawn appointment again only issues the code
    /// it is owed. Issuance returns the existing code when there is one.
    async fn reissue_compensation(
        &self,
        appointment: Appointment,
        now: DateTime<Utc>,
    ) -> Result<CancellationOutcome, AppointmentError> {
        let code = self.compensation.issue_for(&appointment, now).await?;
        info!(
            "Compensation code {} confirmed for cancelled appointment {}",
            code.code, appointment.id
        );
        Ok(CancellationOutcome {
            appointment,
            compensation_code: Some(code),
        })
    }

    async fn cancel_observed(
        &self,
        appointment: &Appointment,
        cancelled_by: CancelledBy,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<CancellationOutcome, AppointmentError> {
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::Cancelled),
            cancelled_by: Some(cancelled_by),
            cancel_reason: Some(reason),
            cancelled_at: Some(now),
            ..Default::default()
        };
        let cancelled = self.apply(appointment, patch).await?;
        info!("Appointment {} cancelled by {}", cancelled.id, cancelled_by);

        let compensation_code = if self
            .lifecycle
            .compensation_due(appointment.status, cancelled_by)
        {
            match self.compensation.issue_for(&cancelled, now).await {
                Ok(code) => Some(code),
                Err(e) => {
                    // The cancellation stands; cancelling again as clinic staff issues the code.
                    error!("Failed to issue compensation for appointment {}: {}", cancelled.id, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(CancellationOutcome {
            appointment: cancelled,
            compensation_code,
        })
    }

    // ==========================================================================
    // COMPLETE / NOT COMING
    // ==========================================================================

    #[instrument(skip(self))]
    pub async fn complete(&self, id: i64, now: DateTime<Utc>) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(id).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Completed)?;
        if now < appointment.appointment_datetime {
            return Err(AppointmentError::NotDue);
        }

        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::Completed),
            completed_at: Some(now),
            ..Default::default()
        };
        let completed = self.apply(&appointment, patch).await?;
        info!("Appointment {} completed", id);
        Ok(completed)
    }

    #[instrument(skip(self))]
    pub async fn mark_not_coming(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(id).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::PatientNotComing)?;
        if now < appointment.appointment_datetime {
            return Err(AppointmentError::NotDue);
        }

        let updated = self
            .apply(
                &appointment,
                AppointmentPatch::status(AppointmentStatus::PatientNotComing),
            )
            .await?;
        info!("Appointment {} marked as patient not coming", id);
        Ok(updated)
    }

    // ==========================================================================
    // RESCHEDULE
    // ==========================================================================

    /// Books a successor at `new_datetime` and retires the original as
    /// `rescheduled`. The successor is withdrawn again if the original
    /// changed status in the meantime.
    #[instrument(skip(self))]
    pub async fn reschedule(
        &self,
        id: i64,
        new_datetime: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RescheduleOutcome, AppointmentError> {
        let original = self.load(id).await?;
        self.lifecycle
            .validate_status_transition(original.status, AppointmentStatus::Rescheduled)?;
        if new_datetime == original.appointment_datetime {
            return Err(AppointmentError::ValidationError(
                "new time equals the current appointment time".to_string(),
            ));
        }

        self.availability
            .ensure_bookable(original.doctor_id, new_datetime, Some(id), now)
            .await?;

        let successor = match self
            .store
            .insert_appointment(NewAppointment {
                patient_id: original.patient_id,
                doctor_id: original.doctor_id,
                appointment_datetime: new_datetime,
                fee: original.fee,
                status: AppointmentStatus::WaitingForConfirmation,
                note: original.note.clone(),
                compensation_code_id: original.compensation_code_id,
                rescheduled_from_id: Some(original.id),
            })
            .await
        {
            Ok(successor) => successor,
            Err(StoreError::Conflict(_)) => {
                return Err(AppointmentError::SlotUnavailable(UnavailableReason::SlotTaken))
            }
            Err(e) => return Err(e.into()),
        };

        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::Rescheduled),
            rescheduled_to_id: Some(successor.id),
            ..Default::default()
        };
        match self.apply(&original, patch).await {
            Ok(retired) => {
                info!("Appointment {} rescheduled as {}", retired.id, successor.id);
                Ok(RescheduleOutcome {
                    original: retired,
                    successor,
                })
            }
            Err(e) => {
                let rollback = AppointmentPatch {
                    status: Some(AppointmentStatus::Cancelled),
                    cancelled_by: Some(CancelledBy::System),
                    cancel_reason: Some("reschedule aborted".to_string()),
                    cancelled_at: Some(now),
                    ..Default::default()
                };
                if let Err(rollback_err) = self.apply(&successor, rollback).await {
                    error!(
                        "Failed to withdraw successor {} of appointment {}: {}",
                        successor.id, id, rollback_err
                    );
                }
                Err(e)
            }
        }
    }

    // ==========================================================================
    // DAY-OFF CASCADE
    // ==========================================================================

    /// Cancels the doctor's open appointments on `date` that fall in one of
    /// `sessions`. Appointments that change state during the sweep are
    /// reported as skipped.
    #[instrument(skip(self))]
    pub async fn cancel_affected_by_day_off(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        sessions: &[Session],
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(Vec<CancellationOutcome>, Vec<i64>), AppointmentError> {
        let from = self.hours.to_utc(date, NaiveTime::MIN);
        let to = self.hours.to_utc(date + Duration::days(1), NaiveTime::MIN);

        let affected: Vec<Appointment> = self
            .store
            .appointments_for_doctor_between(
                doctor_id,
                from,
                to,
                &[AppointmentStatus::WaitingForConfirmation, AppointmentStatus::Accepted],
            )
            .await?
            .into_iter()
            .filter(|a| sessions.contains(&session_of(&self.hours, a.appointment_datetime)))
            .collect();

        debug!("{} appointments affected by day-off of doctor {} on {}", affected.len(), doctor_id, date);

        let mut cancelled = Vec::new();
        let mut skipped = Vec::new();
        for appointment in affected {
            match self
                .cancel_observed(&appointment, CancelledBy::System, reason.to_string(), now)
                .await
            {
                Ok(outcome) => cancelled.push(outcome),
                Err(e) => {
                    warn!("Skipping appointment {} in day-off cascade: {}", appointment.id, e);
                    skipped.push(appointment.id);
                }
            }
        }

        Ok((cancelled, skipped))
    }
}
