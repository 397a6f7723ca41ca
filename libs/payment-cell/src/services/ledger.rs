use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use appointment_cell::AppointmentBookingService;
use prescription_cell::PrescriptionService;
use shared_database::store::PaymentStore;
use shared_database::{ClinicStore, StoreError};
use shared_models::payment::{
    current_payment, NewPayment, Payment, PaymentKind, PaymentPatch, PaymentStatus,
};
use shared_models::prescription::{PrescriptionKind, PrescriptionStatus};
use shared_utils::AppState;

use crate::models::{PaymentError, Settlement, SettlementOutcome};

pub const CASH_METHOD: &str = "cash";

/// Applies gateway results and counter payments to the payment tables.
/// Every write is conditional on the status last read, so a repeated or
/// concurrent delivery can never produce a second `paid` row.
pub struct PaymentLedger {
    store: Arc<dyn ClinicStore>,
    appointments: AppointmentBookingService,
    prescriptions: PrescriptionService,
}

impl PaymentLedger {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            appointments: AppointmentBookingService::new(state),
            prescriptions: PrescriptionService::new(state),
        }
    }

    async fn ensure_owner_exists(&self, kind: PaymentKind, owner_id: i64) -> Result<(), PaymentError> {
        match PrescriptionKind::from_payment_kind(kind) {
            None => {
                self.appointments.get_appointment(owner_id).await?;
            }
            Some(prescription_kind) => {
                self.prescriptions
                    .get_prescription(prescription_kind, owner_id)
                    .await
                    .map_err(|e| PaymentError::from_prescription(kind, e))?;
            }
        }
        Ok(())
    }

    /// Current payment attempt of an owner.
    pub async fn payment_status(
        &self,
        kind: PaymentKind,
        owner_id: i64,
    ) -> Result<Payment, PaymentError> {
        self.ensure_owner_exists(kind, owner_id).await?;
        let payments = self.store.payments_for(kind, owner_id).await?;
        current_payment(&payments)
            .cloned()
            .ok_or(PaymentError::NoPaymentAttempt)
    }

    /// Re-reads after a lost conditional write.
    async fn after_lost_race(
        &self,
        kind: PaymentKind,
        owner_id: i64,
    ) -> Result<SettlementOutcome, PaymentError> {
        let payments = self.store.payments_for(kind, owner_id).await?;
        match payments.into_iter().find(|p| p.status == PaymentStatus::Paid) {
            Some(paid) => {
                info!("{} {} was settled by a concurrent delivery", kind, owner_id);
                Ok(SettlementOutcome::AlreadyPaid(paid))
            }
            None => Err(PaymentError::ConcurrentModification),
        }
    }

    #[instrument(skip(self, settlement), fields(order_id = ?settlement.order_id, result_code = settlement.result_code))]
    pub async fn settle(
        &self,
        kind: PaymentKind,
        owner_id: i64,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, PaymentError> {
        let payments = self.store.payments_for(kind, owner_id).await?;

        if let Some(paid) = payments.iter().find(|p| p.status == PaymentStatus::Paid) {
            info!("{} {} already paid; ignoring repeated settlement", kind, owner_id);
            return Ok(SettlementOutcome::AlreadyPaid(paid.clone()));
        }

        let by_order = settlement
            .order_id
            .as_deref()
            .and_then(|order_id| payments.iter().find(|p| p.order_id.as_deref() == Some(order_id)));
        let target = match by_order {
            Some(payment) => payment,
            None => {
                warn!(
                    "No attempt of {} {} carries order {:?}; using the latest",
                    kind, owner_id, settlement.order_id
                );
                payments.first().ok_or(PaymentError::NoPaymentAttempt)?
            }
        };

        if let Some(received) = settlement.amount {
            if received != target.amount {
                return Err(PaymentError::AmountMismatch {
                    expected: target.amount,
                    received,
                });
            }
        }

        let succeeded = settlement.result_code == 0;
        let patch = if succeeded {
            PaymentPatch {
                status: Some(PaymentStatus::Paid),
                payment_method: settlement.payment_method,
                transaction_ref: settlement.transaction_ref,
                paid_at: Some(now),
            }
        } else {
            PaymentPatch {
                status: Some(PaymentStatus::Cancel),
                transaction_ref: settlement.transaction_ref,
                ..Default::default()
            }
        };

        match self
            .store
            .update_payment(kind, target.id, target.status, patch)
            .await
        {
            Ok(Some(updated)) if succeeded => {
                info!("{} {} paid via payment {}", kind, owner_id, updated.id);
                Ok(SettlementOutcome::Paid(updated))
            }
            Ok(Some(updated)) => {
                info!(
                    "{} {} payment {} failed with code {}",
                    kind, owner_id, updated.id, settlement.result_code
                );
                Ok(SettlementOutcome::Failed(updated))
            }
            Ok(None) | Err(StoreError::Conflict(_)) => self.after_lost_race(kind, owner_id).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Pharmacy counter payment in cash for a prescription waiting for
    /// payment.
    #[instrument(skip(self))]
    pub async fn record_cash_payment(
        &self,
        kind: PrescriptionKind,
        prescription_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Payment, PaymentError> {
        let payment_kind = kind.payment_kind();
        let detail = self
            .prescriptions
            .get_detail(kind, prescription_id)
            .await
            .map_err(|e| PaymentError::from_prescription(payment_kind, e))?;

        if detail.prescription.status != PrescriptionStatus::WaitingPayment {
            return Err(PaymentError::NotPayable(format!(
                "{} is {}; only prescriptions waiting for payment take cash",
                kind, detail.prescription.status
            )));
        }

        let payments = self.store.payments_for(payment_kind, prescription_id).await?;
        if payments.iter().any(|p| p.status == PaymentStatus::Paid) {
            return Err(PaymentError::AlreadyPaid(payment_kind));
        }

        let paid = match payments.iter().find(|p| p.status == PaymentStatus::Pending) {
            Some(pending) => self
                .store
                .update_payment(
                    payment_kind,
                    pending.id,
                    PaymentStatus::Pending,
                    PaymentPatch {
                        status: Some(PaymentStatus::Paid),
                        payment_method: Some(CASH_METHOD.to_string()),
                        paid_at: Some(now),
                        ..Default::default()
                    },
                )
                .await?
                .ok_or(PaymentError::ConcurrentModification)?,
            None => self
                .store
                .insert_payment(
                    payment_kind,
                    NewPayment {
                        owner_id: prescription_id,
                        amount: detail.total,
                        payment_method: Some(CASH_METHOD.to_string()),
                        status: PaymentStatus::Paid,
                        order_id: None,
                        transaction_ref: None,
                        paid_at: Some(now),
                    },
                )
                .await
                .map_err(|e| match e {
                    StoreError::Conflict(_) => PaymentError::AlreadyPaid(payment_kind),
                    other => other.into(),
                })?,
        };

        info!("{} {} paid in cash ({})", kind, prescription_id, paid.amount);
        Ok(paid)
    }
}
