use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payment::PaymentKind;

// ==============================================================================
// PRESCRIPTION RECORDS
// ==============================================================================

/// Appointment-linked prescriptions and retail (walk-in) prescriptions share a
/// lifecycle but live in separate tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionKind {
    Appointment,
    Retail,
}

impl PrescriptionKind {
    pub const ALL: [PrescriptionKind; 2] = [PrescriptionKind::Appointment, PrescriptionKind::Retail];

    pub fn table(&self) -> &'static str {
        match self {
            PrescriptionKind::Appointment => "prescriptions",
            PrescriptionKind::Retail => "retail_prescriptions",
        }
    }

    pub fn medicine_table(&self) -> &'static str {
        match self {
            PrescriptionKind::Appointment => "prescription_medicines",
            PrescriptionKind::Retail => "retail_prescription_medicines",
        }
    }

    pub fn owner_column(&self) -> &'static str {
        match self {
            PrescriptionKind::Appointment => "prescription_id",
            PrescriptionKind::Retail => "retail_prescription_id",
        }
    }

    pub fn payment_kind(&self) -> PaymentKind {
        match self {
            PrescriptionKind::Appointment => PaymentKind::Prescription,
            PrescriptionKind::Retail => PaymentKind::RetailPrescription,
        }
    }

    pub fn from_payment_kind(kind: PaymentKind) -> Option<Self> {
        match kind {
            PaymentKind::Prescription => Some(PrescriptionKind::Appointment),
            PaymentKind::RetailPrescription => Some(PrescriptionKind::Retail),
            PaymentKind::Appointment => None,
        }
    }
}

impl fmt::Display for PrescriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrescriptionKind::Appointment => write!(f, "prescription"),
            PrescriptionKind::Retail => write!(f, "retail prescription"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: i64,
    #[serde(default)]
    pub appointment_id: Option<i64>,
    pub patient_id: Uuid,
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    pub pharmacist_id: Option<Uuid>,
    pub status: PrescriptionStatus,
    pub note: Option<String>,
    pub cancel_reason: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    PendingPrepare,
    WaitingPayment,
    Completed,
    Cancelled,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::PendingPrepare => "pending_prepare",
            PrescriptionStatus::WaitingPayment => "waiting_payment",
            PrescriptionStatus::Completed => "completed",
            PrescriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PrescriptionStatus::Completed | PrescriptionStatus::Cancelled)
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionMedicine {
    pub id: i64,
    #[serde(alias = "prescription_id", alias = "retail_prescription_id")]
    pub owner_id: i64,
    pub medicine_id: i64,
    pub quantity: i32,
    pub unit_price: i64,
    pub dosage: Option<String>,
}

/// Σ quantity × unit price.
pub fn medicines_total(medicines: &[PrescriptionMedicine]) -> i64 {
    medicines
        .iter()
        .map(|m| i64::from(m.quantity) * m.unit_price)
        .sum()
}

// ==============================================================================
// WRITE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPrescriptionMedicine {
    pub medicine_id: i64,
    pub quantity: i32,
    pub unit_price: i64,
    pub dosage: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrescription {
    pub appointment_id: Option<i64>,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub note: Option<String>,
    pub medicines: Vec<NewPrescriptionMedicine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PrescriptionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pharmacist_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl PrescriptionPatch {
    pub fn apply_to(&self, prescription: &mut Prescription) {
        if let Some(status) = self.status {
            prescription.status = status;
        }
        if let Some(id) = self.pharmacist_id {
            prescription.pharmacist_id = Some(id);
        }
        if let Some(reason) = &self.cancel_reason {
            prescription.cancel_reason = Some(reason.clone());
        }
        if let Some(at) = self.confirmed_at {
            prescription.confirmed_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            prescription.completed_at = Some(at);
        }
        if let Some(at) = self.cancelled_at {
            prescription.cancelled_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_multiplies_quantity_by_price() {
        let medicines = vec![
            PrescriptionMedicine {
                id: 1,
                owner_id: 1,
                medicine_id: 10,
                quantity: 2,
                unit_price: 15_000,
                dosage: None,
            },
            PrescriptionMedicine {
                id: 2,
                owner_id: 1,
                medicine_id: 11,
                quantity: 3,
                unit_price: 5_000,
                dosage: Some("twice daily".into()),
            },
        ];
        assert_eq!(medicines_total(&medicines), 45_000);
    }

    #[test]
    fn retail_kind_maps_to_its_payment_table() {
        assert_eq!(
            PrescriptionKind::Retail.payment_kind(),
            PaymentKind::RetailPrescription
        );
        assert_eq!(
            PrescriptionKind::from_payment_kind(PaymentKind::Appointment),
            None
        );
    }
}
