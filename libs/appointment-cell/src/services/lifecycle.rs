use tracing::{debug, warn};

use shared_models::appointment::{Appointment, AppointmentStatus, CancelledBy};

use crate::models::AppointmentError;

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::WaitingForConfirmation => vec![
                AppointmentStatus::Accepted,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::Accepted => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::PatientNotComing,
                AppointmentStatus::Rescheduled,
            ],
            // Terminal states
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::PatientNotComing
            | AppointmentStatus::Rescheduled => vec![],
        }
    }

    /// A cancellation owes the patient a compensation code only when the
    /// clinic side withdraws an appointment it had already accepted.
    pub fn compensation_due(&self, previous_status: AppointmentStatus, cancelled_by: CancelledBy) -> bool {
        previous_status == AppointmentStatus::Accepted && cancelled_by.is_clinic_side()
    }

    /// True for an appointment the clinic side cancelled after accepting it.
    /// Only accepted appointments carry `accepted_at` into `cancelled`.
    pub fn compensation_owed(&self, appointment: &Appointment) -> bool {
        appointment.status == AppointmentStatus::Cancelled
            && appointment.accepted_at.is_some()
            && appointment
                .cancelled_by
                .is_some_and(|by| by.is_clinic_side())
    }
}
