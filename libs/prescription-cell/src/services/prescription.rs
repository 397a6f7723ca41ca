use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::AppointmentBookingService;
use shared_config::ClinicHours;
use shared_database::store::{PaymentStore, PrescriptionStore};
use shared_database::{ClinicStore, StoreError};
use shared_models::appointment::AppointmentStatus;
use shared_models::payment::{current_payment, NewPayment, PaymentPatch, PaymentStatus};
use shared_models::prescription::{
    medicines_total, NewPrescription, NewPrescriptionMedicine, Prescription, PrescriptionKind,
    PrescriptionPatch, PrescriptionStatus,
};
use shared_utils::AppState;

use crate::models::{
    CreatePrescriptionRequest, CreateRetailPrescriptionRequest, DispenseLine, PrescriptionDetail,
    PrescriptionError,
};
use crate::services::inventory::InventoryService;
use crate::services::lifecycle::PrescriptionLifecycleService;

fn validate_medicines(medicines: &[NewPrescriptionMedicine]) -> Result<(), PrescriptionError> {
    if medicines.is_empty() {
        return Err(PrescriptionError::ValidationError(
            "at least one medicine is required".to_string(),
        ));
    }
    if let Some(bad) = medicines.iter().find(|m| m.quantity <= 0) {
        return Err(PrescriptionError::ValidationError(format!(
            "medicine {} must have a positive quantity",
            bad.medicine_id
        )));
    }
    if let Some(bad) = medicines.iter().find(|m| m.unit_price < 0) {
        return Err(PrescriptionError::ValidationError(format!(
            "medicine {} has a negative unit price",
            bad.medicine_id
        )));
    }
    Ok(())
}

pub struct PrescriptionService {
    store: Arc<dyn ClinicStore>,
    hours: ClinicHours,
    appointments: AppointmentBookingService,
    inventory: InventoryService,
    lifecycle: PrescriptionLifecycleService,
}

impl PrescriptionService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            hours: state.config.clinic.clone(),
            appointments: AppointmentBookingService::new(state),
            inventory: InventoryService::new(state),
            lifecycle: PrescriptionLifecycleService::new(),
        }
    }

    pub async fn get_prescription(
        &self,
        kind: PrescriptionKind,
        id: i64,
    ) -> Result<Prescription, PrescriptionError> {
        self.store
            .get_prescription(kind, id)
            .await?
            .ok_or(PrescriptionError::NotFound)
    }

    pub async fn get_detail(
        &self,
        kind: PrescriptionKind,
        id: i64,
    ) -> Result<PrescriptionDetail, PrescriptionError> {
        let prescription = self.get_prescription(kind, id).await?;
        let medicines = self.store.prescription_medicines(kind, id).await?;
        let payments = self.store.payments_for(kind.payment_kind(), id).await?;

        Ok(PrescriptionDetail {
            total: medicines_total(&medicines),
            payment: current_payment(&payments).cloned(),
            prescription,
            medicines,
        })
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    /// Prescription for a completed appointment. The prescribing doctor is
    /// the appointment's doctor.
    #[instrument(skip(self, request), fields(appointment_id = request.appointment_id))]
    pub async fn create(
        &self,
        request: CreatePrescriptionRequest,
    ) -> Result<Prescription, PrescriptionError> {
        validate_medicines(&request.medicines)?;

        let appointment = self
            .appointments
            .get_appointment(request.appointment_id)
            .await?;
        if appointment.status != AppointmentStatus::Completed {
            return Err(PrescriptionError::AppointmentNotCompleted(appointment.status));
        }
        if self
            .store
            .prescription_for_appointment(appointment.id)
            .await?
            .is_some()
        {
            return Err(PrescriptionError::AlreadyPrescribed(appointment.id));
        }

        let new_prescription = NewPrescription {
            appointment_id: Some(appointment.id),
            patient_id: appointment.patient_id,
            doctor_id: Some(appointment.doctor_id),
            note: request.note,
            medicines: request.medicines,
        };

        let prescription = match self
            .store
            .insert_prescription(PrescriptionKind::Appointment, new_prescription)
            .await
        {
            Ok(prescription) => prescription,
            Err(StoreError::Conflict(_)) => {
                return Err(PrescriptionError::AlreadyPrescribed(appointment.id))
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Prescription {} created for appointment {}",
            prescription.id, appointment.id
        );
        Ok(prescription)
    }

    #[instrument(skip(self, request), fields(patient_id = %request.patient_id))]
    pub async fn create_retail(
        &self,
        request: CreateRetailPrescriptionRequest,
    ) -> Result<Prescription, PrescriptionError> {
        validate_medicines(&request.medicines)?;

        let prescription = self
            .store
            .insert_prescription(
                PrescriptionKind::Retail,
                NewPrescription {
                    appointment_id: None,
                    patient_id: request.patient_id,
                    doctor_id: None,
                    note: request.note,
                    medicines: request.medicines,
                },
            )
            .await?;

        info!("Retail prescription {} created", prescription.id);
        Ok(prescription)
    }

    // ==========================================================================
    // TRANSITIONS
    // ==========================================================================

    async fn apply(
        &self,
        kind: PrescriptionKind,
        observed: &Prescription,
        patch: PrescriptionPatch,
    ) -> Result<Prescription, PrescriptionError> {
        self.store
            .transition_prescription(kind, observed.id, observed.status, patch)
            .await?
            .ok_or_else(|| {
                warn!("{} {} left status {} before the write", kind, observed.id, observed.status);
                PrescriptionError::ConcurrentModification
            })
    }

    /// Pharmacist has prepared the medicines; the prescription now waits for
    /// payment of Σ quantity × unit price.
    #[instrument(skip(self))]
    pub async fn mark_prepared(
        &self,
        kind: PrescriptionKind,
        id: i64,
        pharmacist_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PrescriptionDetail, PrescriptionError> {
        let prescription = self.get_prescription(kind, id).await?;
        self.lifecycle
            .validate_status_transition(prescription.status, PrescriptionStatus::WaitingPayment)?;

        let medicines = self.store.prescription_medicines(kind, id).await?;
        let total = medicines_total(&medicines);

        let patch = PrescriptionPatch {
            status: Some(PrescriptionStatus::WaitingPayment),
            pharmacist_id: Some(pharmacist_id),
            confirmed_at: Some(now),
            ..Default::default()
        };
        let prepared = self.apply(kind, &prescription, patch).await?;

        let payment = match self
            .store
            .insert_payment(
                kind.payment_kind(),
                NewPayment {
                    owner_id: id,
                    amount: total,
                    payment_method: None,
                    status: PaymentStatus::Pending,
                    order_id: None,
                    transaction_ref: None,
                    paid_at: None,
                },
            )
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                self.unprepare(kind, &prepared).await;
                return Err(e.into());
            }
        };

        info!("{} {} prepared; awaiting payment of {}", kind, id, total);
        Ok(PrescriptionDetail {
            prescription: prepared,
            medicines,
            total,
            payment: Some(payment),
        })
    }

    /// Puts a prescription whose payment row could not be opened back to
    /// `pending_prepare` so preparation can be retried.
    async fn unprepare(&self, kind: PrescriptionKind, prepared: &Prescription) {
        let patch = PrescriptionPatch {
            status: Some(PrescriptionStatus::PendingPrepare),
            ..Default::default()
        };
        match self
            .store
            .transition_prescription(kind, prepared.id, prepared.status, patch)
            .await
        {
            Ok(Some(_)) => warn!("{} {} returned to pending_prepare", kind, prepared.id),
            Ok(None) => warn!("{} {} changed status before it could be reverted", kind, prepared.id),
            Err(e) => error!("Failed to revert {} {} to pending_prepare: {}", kind, prepared.id, e),
        }
    }

    /// Hands the medicines over. Requires a paid sub-record; stock leaves
    /// the earliest-expiring batches first.
    #[instrument(skip(self))]
    pub async fn complete(
        &self,
        kind: PrescriptionKind,
        id: i64,
        pharmacist_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Prescription, Vec<DispenseLine>), PrescriptionError> {
        let prescription = self.get_prescription(kind, id).await?;
        self.lifecycle
            .validate_status_transition(prescription.status, PrescriptionStatus::Completed)?;

        let payments = self.store.payments_for(kind.payment_kind(), id).await?;
        if !payments.iter().any(|p| p.status == PaymentStatus::Paid) {
            return Err(PrescriptionError::NotPaid);
        }

        let medicines = self.store.prescription_medicines(kind, id).await?;
        let dispensed = self
            .inventory
            .dispense(&medicines, self.hours.local_date(now))
            .await?;

        let patch = PrescriptionPatch {
            status: Some(PrescriptionStatus::Completed),
            pharmacist_id: Some(pharmacist_id),
            completed_at: Some(now),
            ..Default::default()
        };
        let completed = match self.apply(kind, &prescription, patch).await {
            Ok(completed) => completed,
            Err(e) => {
                self.inventory.restore(&dispensed).await;
                return Err(e);
            }
        };

        info!("{} {} completed; {} batch lines dispensed", kind, id, dispensed.len());
        Ok((completed, dispensed.into_iter().map(|(_, line)| line).collect()))
    }

    /// Cancels an open prescription and withdraws its pending payment
    /// attempts.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        kind: PrescriptionKind,
        id: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Prescription, PrescriptionError> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                PrescriptionError::ValidationError("a cancellation reason is required".to_string())
            })?;

        let prescription = self.get_prescription(kind, id).await?;
        self.lifecycle
            .validate_status_transition(prescription.status, PrescriptionStatus::Cancelled)?;

        let patch = PrescriptionPatch {
            status: Some(PrescriptionStatus::Cancelled),
            cancel_reason: Some(reason),
            cancelled_at: Some(now),
            ..Default::default()
        };
        let cancelled = self.apply(kind, &prescription, patch).await?;

        let payment_kind = kind.payment_kind();
        for pending in self
            .store
            .payments_for(payment_kind, id)
            .await?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Pending)
        {
            let patch = PaymentPatch {
                status: Some(PaymentStatus::Cancel),
                ..Default::default()
            };
            if let Err(e) = self
                .store
                .update_payment(payment_kind, pending.id, PaymentStatus::Pending, patch)
                .await
            {
                error!("Failed to cancel pending payment {} of {} {}: {}", pending.id, kind, id, e);
            }
        }

        info!("{} {} cancelled", kind, id);
        Ok(cancelled)
    }
}
