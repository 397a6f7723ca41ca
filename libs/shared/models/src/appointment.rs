use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// APPOINTMENT RECORD
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_datetime: DateTime<Utc>,
    /// Fee in minor currency units, after any compensation discount.
    pub fee: i64,
    pub status: AppointmentStatus,
    pub note: Option<String>,
    pub compensation_code_id: Option<i64>,
    pub cancelled_by: Option<CancelledBy>,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rescheduled_from_id: Option<i64>,
    pub rescheduled_to_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    WaitingForConfirmation,
    Accepted,
    Completed,
    Cancelled,
    PatientNotComing,
    Rescheduled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::WaitingForConfirmation,
        AppointmentStatus::Accepted,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::PatientNotComing,
        AppointmentStatus::Rescheduled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::WaitingForConfirmation => "waiting_for_confirmation",
            AppointmentStatus::Accepted => "accepted",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::PatientNotComing => "patient_not_coming",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::WaitingForConfirmation | AppointmentStatus::Accepted
        )
    }

    /// Whether an appointment in this status still occupies its slot.
    /// Rescheduled appointments hand their slot over to the successor.
    pub fn blocks_slot(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Rescheduled
        )
    }

    pub fn slot_blocking() -> Vec<AppointmentStatus> {
        Self::ALL.into_iter().filter(|s| s.blocks_slot()).collect()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who initiated a cancellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    Admin,
    System,
}

impl CancelledBy {
    /// Clinic-side cancellations owe the patient a compensation code.
    pub fn is_clinic_side(&self) -> bool {
        !matches!(self, CancelledBy::Patient)
    }
}

impl fmt::Display for CancelledBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelledBy::Patient => write!(f, "patient"),
            CancelledBy::Doctor => write!(f, "doctor"),
            CancelledBy::Admin => write!(f, "admin"),
            CancelledBy::System => write!(f, "system"),
        }
    }
}

// ==============================================================================
// WRITE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_datetime: DateTime<Utc>,
    pub fee: i64,
    pub status: AppointmentStatus,
    pub note: Option<String>,
    pub compensation_code_id: Option<i64>,
    pub rescheduled_from_id: Option<i64>,
}

/// Partial update applied together with a status precondition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_datetime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<CancelledBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescheduled_to_id: Option<i64>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Applies the set fields to an in-memory record.
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(doctor_id) = self.doctor_id {
            appointment.doctor_id = doctor_id;
        }
        if let Some(at) = self.appointment_datetime {
            appointment.appointment_datetime = at;
        }
        if let Some(by) = self.cancelled_by {
            appointment.cancelled_by = Some(by);
        }
        if let Some(reason) = &self.cancel_reason {
            appointment.cancel_reason = Some(reason.clone());
        }
        if let Some(at) = self.cancelled_at {
            appointment.cancelled_at = Some(at);
        }
        if let Some(at) = self.accepted_at {
            appointment.accepted_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            appointment.completed_at = Some(at);
        }
        if let Some(id) = self.rescheduled_to_id {
            appointment.rescheduled_to_id = Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_value(AppointmentStatus::WaitingForConfirmation).unwrap(),
            json!("waiting_for_confirmation")
        );
        let parsed: AppointmentStatus = serde_json::from_value(json!("patient_not_coming")).unwrap();
        assert_eq!(parsed, AppointmentStatus::PatientNotComing);
    }

    #[test]
    fn only_cancelled_and_rescheduled_release_the_slot() {
        let blocking = AppointmentStatus::slot_blocking();
        assert_eq!(blocking.len(), 4);
        assert!(!blocking.contains(&AppointmentStatus::Cancelled));
        assert!(!blocking.contains(&AppointmentStatus::Rescheduled));
    }

    #[test]
    fn patch_skips_unset_fields() {
        let patch = AppointmentPatch::status(AppointmentStatus::Accepted);
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"status": "accepted"}));
    }
}
