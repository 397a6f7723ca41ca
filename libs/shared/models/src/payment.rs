use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a payment settles. Each kind lives in its own table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Appointment,
    Prescription,
    RetailPrescription,
}

impl PaymentKind {
    pub fn table(&self) -> &'static str {
        match self {
            PaymentKind::Appointment => "payments",
            PaymentKind::Prescription => "prescription_payments",
            PaymentKind::RetailPrescription => "retail_prescription_payments",
        }
    }

    pub fn owner_column(&self) -> &'static str {
        match self {
            PaymentKind::Appointment => "appointment_id",
            PaymentKind::Prescription => "prescription_id",
            PaymentKind::RetailPrescription => "retail_prescription_id",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Appointment => "appointment",
            PaymentKind::Prescription => "prescription",
            PaymentKind::RetailPrescription => "retail_prescription",
        }
    }

    /// Route segment under `/payments`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            PaymentKind::Appointment => "appointments",
            PaymentKind::Prescription => "prescriptions",
            PaymentKind::RetailPrescription => "retail-prescriptions",
        }
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appointment" => Ok(PaymentKind::Appointment),
            "prescription" => Ok(PaymentKind::Prescription),
            "retail_prescription" => Ok(PaymentKind::RetailPrescription),
            other => Err(format!("unknown payment kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancel,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancel => "cancel",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment attempt. `owner_id` is the appointment, prescription or
/// retail prescription id depending on the table the row came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: i64,
    #[serde(alias = "appointment_id", alias = "prescription_id", alias = "retail_prescription_id")]
    pub owner_id: i64,
    pub amount: i64,
    pub payment_method: Option<String>,
    pub status: PaymentStatus,
    pub order_id: Option<String>,
    pub transaction_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub owner_id: i64,
    pub amount: i64,
    pub payment_method: Option<String>,
    pub status: PaymentStatus,
    pub order_id: Option<String>,
    pub transaction_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentPatch {
    pub fn apply_to(&self, payment: &mut Payment) {
        if let Some(status) = self.status {
            payment.status = status;
        }
        if let Some(method) = &self.payment_method {
            payment.payment_method = Some(method.clone());
        }
        if let Some(reference) = &self.transaction_ref {
            payment.transaction_ref = Some(reference.clone());
        }
        if let Some(at) = self.paid_at {
            payment.paid_at = Some(at);
        }
    }
}

/// Current status across all attempts: a paid attempt wins, otherwise the
/// most recent one.
pub fn current_payment(payments: &[Payment]) -> Option<&Payment> {
    payments
        .iter()
        .find(|p| p.status == PaymentStatus::Paid)
        .or_else(|| payments.iter().max_by_key(|p| (p.created_at, p.id)))
}

/// Callback that could not be applied, kept for operator follow-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackFailure {
    pub kind: PaymentKind,
    pub owner_id: i64,
    pub order_id: Option<String>,
    pub reason: String,
    pub payload: serde_json::Value,
}
