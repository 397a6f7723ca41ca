use serde::{Deserialize, Serialize};
use thiserror::Error;

use appointment_cell::AppointmentError;
use prescription_cell::PrescriptionError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::payment::{Payment, PaymentKind};

// ==============================================================================
// GATEWAY WIRE MODELS
// ==============================================================================

/// Signed create request sent to the wallet gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCreateRequest {
    pub partner_code: String,
    pub request_id: String,
    pub amount: i64,
    pub order_id: String,
    pub order_info: String,
    pub redirect_url: String,
    pub ipn_url: String,
    pub lang: String,
    pub request_type: String,
    pub extra_data: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCreateResponse {
    #[serde(default)]
    pub partner_code: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub response_time: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    pub result_code: i64,
    #[serde(default)]
    pub pay_url: Option<String>,
}

/// Payment notification posted back by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayCallback {
    pub partner_code: String,
    pub order_id: String,
    pub request_id: String,
    pub amount: Option<i64>,
    pub order_info: String,
    pub order_type: String,
    pub trans_id: Option<i64>,
    pub result_code: Option<i64>,
    pub message: String,
    pub pay_type: String,
    pub response_time: Option<i64>,
    pub extra_data: String,
    pub signature: Option<String>,
}

/// Decoded `extraData`: which record the payment belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentReference {
    pub kind: PaymentKind,
    pub id: i64,
}

/// What the checkout service asks the gateway to charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub kind: PaymentKind,
    pub owner_id: i64,
    pub order_id: String,
    pub amount: i64,
    pub order_info: String,
}

// ==============================================================================
// LEDGER MODELS
// ==============================================================================

/// Structurally valid callback, ready to be applied to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub order_id: Option<String>,
    pub result_code: i64,
    pub amount: Option<i64>,
    pub transaction_ref: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Paid(Payment),
    Failed(Payment),
    /// The owner was settled before; nothing changed.
    AlreadyPaid(Payment),
}

impl SettlementOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            SettlementOutcome::Paid(p)
            | SettlementOutcome::Failed(p)
            | SettlementOutcome::AlreadyPaid(p) => p,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub pay_url: String,
    pub order_id: String,
    pub amount: i64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{0} not found or not payable")]
    OwnerNotFound(PaymentKind),

    #[error("{0}")]
    NotPayable(String),

    #[error("{0} is already paid")]
    AlreadyPaid(PaymentKind),

    #[error("No payment attempt found")]
    NoPaymentAttempt,

    #[error("Amount mismatch: expected {expected}, got {received}")]
    AmountMismatch { expected: i64, received: i64 },

    #[error("Callback does not belong to this record: {0}")]
    IdMismatch(String),

    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    #[error("Invalid callback signature")]
    InvalidSignature,

    #[error("Unsigned callbacks are not accepted")]
    UnsignedCallback,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway rejected the request ({code}): {message}")]
    GatewayRejected { code: i64, message: String },

    #[error("Payment gateway is not configured")]
    NotConfigured,

    #[error("Payment changed concurrently")]
    ConcurrentModification,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AppointmentError> for PaymentError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => PaymentError::OwnerNotFound(PaymentKind::Appointment),
            AppointmentError::Store(e) => PaymentError::Store(e),
            other => PaymentError::NotPayable(other.to_string()),
        }
    }
}

impl PaymentError {
    /// Maps prescription lookups for the given payment kind.
    pub fn from_prescription(kind: PaymentKind, e: PrescriptionError) -> Self {
        match e {
            PrescriptionError::NotFound => PaymentError::OwnerNotFound(kind),
            PrescriptionError::Store(e) => PaymentError::Store(e),
            other => PaymentError::NotPayable(other.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::OwnerNotFound(_) | PaymentError::NoPaymentAttempt => {
                AppError::NotFound(e.to_string())
            }
            PaymentError::NotPayable(_)
            | PaymentError::AlreadyPaid(_)
            | PaymentError::AmountMismatch { .. }
            | PaymentError::IdMismatch(_)
            | PaymentError::MalformedCallback(_)
            | PaymentError::InvalidSignature
            | PaymentError::UnsignedCallback => AppError::BadRequest(e.to_string()),
            PaymentError::GatewayUnavailable(_) => AppError::ServiceUnavailable(e.to_string()),
            PaymentError::GatewayRejected { .. } => AppError::ExternalService(e.to_string()),
            PaymentError::NotConfigured => AppError::Internal(e.to_string()),
            PaymentError::ConcurrentModification => AppError::Conflict(e.to_string()),
            PaymentError::Store(e) => e.into(),
        }
    }
}
