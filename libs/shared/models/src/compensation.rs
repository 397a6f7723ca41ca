use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discount voucher issued to a patient when the clinic cancels an accepted
/// appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompensationCode {
    pub id: i64,
    pub code: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub source_appointment_id: i64,
    pub discount_percent: i32,
    pub is_used: bool,
    pub used_appointment_id: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CompensationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Unused, unexpired and owned by `patient_id`.
    pub fn is_redeemable(&self, patient_id: Uuid, now: DateTime<Utc>) -> bool {
        !self.is_used && !self.is_expired(now) && self.patient_id == patient_id
    }

    /// Fee left after applying this code's discount, rounded down to whole
    /// minor units.
    pub fn discounted_fee(&self, fee: i64) -> i64 {
        let percent = i64::from(self.discount_percent.clamp(0, 100));
        fee - fee * percent / 100
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompensationCode {
    pub code: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub source_appointment_id: i64,
    pub discount_percent: i32,
    pub expires_at: DateTime<Utc>,
}
