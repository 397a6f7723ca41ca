use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};
use uuid::Uuid;

use appointment_cell::AppointmentBookingService;
use prescription_cell::PrescriptionService;
use shared_database::store::PaymentStore;
use shared_database::ClinicStore;
use shared_models::appointment::AppointmentStatus;
use shared_models::payment::{NewPayment, PaymentKind, PaymentPatch, PaymentStatus};
use shared_models::prescription::{PrescriptionKind, PrescriptionStatus};
use shared_utils::AppState;

use crate::models::{CheckoutResponse, GatewayOrder, PaymentError};
use crate::services::gateway::{order_id_for, HttpPaymentGateway, PaymentGateway};

/// Who pays and how much, read from the owning record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payable {
    pub patient_id: Uuid,
    pub amount: i64,
    pub description: String,
}

/// Starts gateway payments for completed appointments and prepared
/// prescriptions.
pub struct CheckoutService {
    store: Arc<dyn ClinicStore>,
    gateway: Arc<dyn PaymentGateway>,
    appointments: AppointmentBookingService,
    prescriptions: PrescriptionService,
}

impl CheckoutService {
    pub fn new(state: &AppState) -> Result<Self, PaymentError> {
        let gateway = HttpPaymentGateway::new(&state.config.payment)?;
        Ok(Self::with_gateway(state, Arc::new(gateway)))
    }

    pub fn with_gateway(state: &AppState, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            store: state.store.clone(),
            gateway,
            appointments: AppointmentBookingService::new(state),
            prescriptions: PrescriptionService::new(state),
        }
    }

    /// Appointments become payable once completed; prescriptions once
    /// prepared.
    pub async fn payable(&self, kind: PaymentKind, owner_id: i64) -> Result<Payable, PaymentError> {
        match PrescriptionKind::from_payment_kind(kind) {
            None => {
                let appointment = self.appointments.get_appointment(owner_id).await?;
                if appointment.status != AppointmentStatus::Completed {
                    return Err(PaymentError::OwnerNotFound(kind));
                }
                Ok(Payable {
                    patient_id: appointment.patient_id,
                    amount: appointment.fee,
                    description: format!("Appointment #{}", owner_id),
                })
            }
            Some(prescription_kind) => {
                let detail = self
                    .prescriptions
                    .get_detail(prescription_kind, owner_id)
                    .await
                    .map_err(|e| PaymentError::from_prescription(kind, e))?;
                if detail.prescription.status != PrescriptionStatus::WaitingPayment {
                    return Err(PaymentError::NotPayable(format!(
                        "{} is {}; only prepared prescriptions can be paid",
                        prescription_kind, detail.prescription.status
                    )));
                }
                Ok(Payable {
                    patient_id: detail.prescription.patient_id,
                    amount: detail.total,
                    description: format!("Prescription #{}", owner_id),
                })
            }
        }
    }

    /// Registers a new gateway order. A declined or unreachable gateway
    /// leaves no local row; a successful one supersedes earlier pending
    /// attempts.
    #[instrument(skip(self))]
    pub async fn create_payment(
        &self,
        kind: PaymentKind,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<CheckoutResponse, PaymentError> {
        let payable = self.payable(kind, owner_id).await?;

        let previous = self.store.payments_for(kind, owner_id).await?;
        if previous.iter().any(|p| p.status == PaymentStatus::Paid) {
            return Err(PaymentError::AlreadyPaid(kind));
        }

        let order = GatewayOrder {
            kind,
            owner_id,
            order_id: order_id_for(owner_id, now.timestamp_millis()),
            amount: payable.amount,
            order_info: payable.description,
        };
        let response = self.gateway.create_payment(order.clone()).await?;
        let pay_url = response.pay_url.ok_or_else(|| PaymentError::GatewayRejected {
            code: response.result_code,
            message: "no payment url".to_string(),
        })?;

        let payment = self
            .store
            .insert_payment(
                kind,
                NewPayment {
                    owner_id,
                    amount: order.amount,
                    payment_method: None,
                    status: PaymentStatus::Pending,
                    order_id: Some(order.order_id.clone()),
                    transaction_ref: None,
                    paid_at: None,
                },
            )
            .await?;

        for stale in previous.iter().filter(|p| p.status == PaymentStatus::Pending) {
            let patch = PaymentPatch {
                status: Some(PaymentStatus::Cancel),
                ..Default::default()
            };
            if let Err(e) = self
                .store
                .update_payment(kind, stale.id, PaymentStatus::Pending, patch)
                .await
            {
                error!("Failed to supersede payment {} of {} {}: {}", stale.id, kind, owner_id, e);
            }
        }

        info!("Payment {} opened for {} {} as order {}", payment.id, kind, owner_id, order.order_id);
        Ok(CheckoutResponse {
            pay_url,
            order_id: order.order_id,
            amount: order.amount,
        })
    }
}
