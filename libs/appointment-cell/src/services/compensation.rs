use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use rand::Rng;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::ClinicPolicy;
use shared_database::store::CompensationStore;
use shared_database::{ClinicStore, StoreError};
use shared_models::appointment::Appointment;
use shared_models::compensation::{CompensationCode, NewCompensationCode};
use shared_utils::AppState;

use crate::models::AppointmentError;

const CODE_LENGTH: usize = 8;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_ISSUE_ATTEMPTS: usize = 5;

/// Random code of uppercase letters and digits.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively and without surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub struct CompensationService {
    store: Arc<dyn ClinicStore>,
    policy: ClinicPolicy,
}

impl CompensationService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            policy: state.config.policy.clone(),
        }
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months = self.policy.compensation_validity_months;
        now.checked_add_months(Months::new(months))
            .unwrap_or_else(|| now + Duration::days(30 * i64::from(months)))
    }

    /// Issues the code owed for a cancelled appointment. Returns the existing
    /// code when one was already issued for it.
    #[instrument(skip(self, appointment), fields(appointment_id = appointment.id))]
    pub async fn issue_for(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<CompensationCode, AppointmentError> {
        if let Some(existing) = self.store.compensation_code_for_appointment(appointment.id).await? {
            debug!("Compensation code already issued for appointment {}", appointment.id);
            return Ok(existing);
        }

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let new_code = NewCompensationCode {
                code: generate_code(),
                patient_id: appointment.patient_id,
                doctor_id: appointment.doctor_id,
                source_appointment_id: appointment.id,
                discount_percent: self.policy.compensation_discount_percent,
                expires_at: self.expiry_from(now),
            };

            match self.store.insert_compensation_code(new_code).await {
                Ok(code) => {
                    info!(
                        "Issued compensation code {} to patient {} for appointment {}",
                        code.code, code.patient_id, appointment.id
                    );
                    return Ok(code);
                }
                Err(StoreError::Conflict(msg)) => {
                    // Either a concurrent issuer won or the random code collided.
                    if let Some(existing) =
                        self.store.compensation_code_for_appointment(appointment.id).await?
                    {
                        return Ok(existing);
                    }
                    warn!("Compensation code collision on attempt {}: {}", attempt, msg);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppointmentError::Store(StoreError::Conflict(
            "could not allocate a unique compensation code".to_string(),
        )))
    }

    pub async fn lookup(&self, code: &str) -> Result<CompensationCode, AppointmentError> {
        self.store
            .find_compensation_code(&normalize_code(code))
            .await?
            .ok_or(AppointmentError::CompensationCodeNotFound)
    }

    /// Resolves a code supplied at booking. Unknown, foreign, used and
    /// expired codes are all rejected as invalid.
    pub async fn validate_for_booking(
        &self,
        code: &str,
        patient_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CompensationCode, AppointmentError> {
        let Some(found) = self.store.find_compensation_code(&normalize_code(code)).await? else {
            return Err(AppointmentError::InvalidCompensationCode(
                "code does not exist".to_string(),
            ));
        };

        if found.patient_id != patient_id {
            return Err(AppointmentError::InvalidCompensationCode(
                "code belongs to another patient".to_string(),
            ));
        }
        if found.is_used {
            return Err(AppointmentError::InvalidCompensationCode(
                "code has already been used".to_string(),
            ));
        }
        if found.is_expired(now) {
            return Err(AppointmentError::InvalidCompensationCode(
                "code has expired".to_string(),
            ));
        }

        Ok(found)
    }
}
