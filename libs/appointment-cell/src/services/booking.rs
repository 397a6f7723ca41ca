use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use doctor_cell::{AvailabilityService, UnavailableReason};
use shared_config::ClinicPolicy;
use shared_database::store::{AppointmentStore, CompensationStore};
use shared_database::{ClinicStore, StoreError};
use shared_models::appointment::{
    Appointment, AppointmentPatch, AppointmentStatus, CancelledBy, NewAppointment,
};
use shared_utils::AppState;

use crate::models::{AppointmentError, BookAppointmentRequest};
use crate::services::compensation::CompensationService;

pub struct AppointmentBookingService {
    store: Arc<dyn ClinicStore>,
    availability: AvailabilityService,
    compensation: CompensationService,
    policy: ClinicPolicy,
}

impl AppointmentBookingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            availability: AvailabilityService::new(state),
            compensation: CompensationService::new(state),
            policy: state.config.policy.clone(),
        }
    }

    pub async fn get_appointment(&self, id: i64) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    /// Books a new appointment in `waiting_for_confirmation`.
    ///
    /// The slot is checked against the doctor's availability first; the
    /// store's uniqueness rule settles any race that slips past the check.
    /// A supplied compensation code lowers the fee and is redeemed against
    /// the new appointment.
    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id))]
    pub async fn book(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        self.availability
            .ensure_bookable(request.doctor_id, request.appointment_datetime, None, now)
            .await?;

        let code = match request.compensation_code.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(code) => Some(
                self.compensation
                    .validate_for_booking(code, patient_id, now)
                    .await?,
            ),
            None => None,
        };

        let fee = match &code {
            Some(code) => code.discounted_fee(self.policy.consultation_fee),
            None => self.policy.consultation_fee,
        };

        let new_appointment = NewAppointment {
            patient_id,
            doctor_id: request.doctor_id,
            appointment_datetime: request.appointment_datetime,
            fee,
            status: AppointmentStatus::WaitingForConfirmation,
            note: request.note,
            compensation_code_id: code.as_ref().map(|c| c.id),
            rescheduled_from_id: None,
        };

        let appointment = match self.store.insert_appointment(new_appointment).await {
            Ok(appointment) => appointment,
            Err(StoreError::Conflict(msg)) => {
                warn!("Lost booking race for doctor {}: {}", request.doctor_id, msg);
                return Err(AppointmentError::SlotUnavailable(UnavailableReason::SlotTaken));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(code) = code {
            let redeemed = self
                .store
                .redeem_compensation_code(code.id, appointment.id, now)
                .await?;
            if redeemed.is_none() {
                warn!(
                    "Compensation code {} was redeemed concurrently; releasing appointment {}",
                    code.code, appointment.id
                );
                self.release(&appointment, now).await;
                return Err(AppointmentError::CompensationCodeTaken);
            }
            info!("Redeemed compensation code {} on appointment {}", code.code, appointment.id);
        }

        info!(
            "Booked appointment {} for patient {} with doctor {} at {} (fee {})",
            appointment.id,
            patient_id,
            appointment.doctor_id,
            appointment.appointment_datetime,
            appointment.fee
        );
        Ok(appointment)
    }

    /// Frees the slot of a booking whose code redemption failed.
    async fn release(&self, appointment: &Appointment, now: DateTime<Utc>) {
        let patch = AppointmentPatch {
            status: Some(AppointmentStatus::Cancelled),
            cancelled_by: Some(CancelledBy::System),
            cancel_reason: Some("compensation code already redeemed".to_string()),
            cancelled_at: Some(now),
            ..Default::default()
        };
        if let Err(e) = self
            .store
            .transition_appointment(appointment.id, appointment.status, patch)
            .await
        {
            warn!("Failed to release appointment {}: {}", appointment.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use shared_config::ClinicHours;
    use shared_database::store::ScheduleStore;
    use shared_models::schedule::Schedule;
    use shared_utils::test_utils::{Fixtures, TestConfig};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        ClinicHours::default().to_utc(monday(), NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn now() -> DateTime<Utc> {
        at(9, 0) - Duration::days(7)
    }

    fn request(doctor_id: Uuid, at: DateTime<Utc>, code: Option<&str>) -> BookAppointmentRequest {
        BookAppointmentRequest {
            doctor_id,
            appointment_datetime: at,
            note: Some("first visit".to_string()),
            compensation_code: code.map(str::to_string),
            patient_id: None,
        }
    }

    #[tokio::test]
    async fn booking_charges_the_consultation_fee() {
        let (state, store) = TestConfig::default().to_state();
        let doctor = Uuid::new_v4();
        store.upsert_schedule(Schedule::weekdays(doctor)).await.unwrap();

        let service = AppointmentBookingService::new(&state);
        let appointment = service
            .book(Uuid::new_v4(), request(doctor, at(9, 0), None), now())
            .await
            .unwrap();

        assert_eq!(appointment.status, AppointmentStatus::WaitingForConfirmation);
        assert_eq!(appointment.fee, 200_000);
        assert_eq!(appointment.compensation_code_id, None);
    }

    #[tokio::test]
    async fn second_booking_of_a_slot_conflicts() {
        let (state, store) = TestConfig::default().to_state();
        let doctor = Uuid::new_v4();
        store.upsert_schedule(Schedule::weekdays(doctor)).await.unwrap();

        let service = AppointmentBookingService::new(&state);
        service
            .book(Uuid::new_v4(), request(doctor, at(10, 0), None), now())
            .await
            .unwrap();

        assert_matches!(
            service
                .book(Uuid::new_v4(), request(doctor, at(10, 0), None), now())
                .await,
            Err(AppointmentError::SlotUnavailable(UnavailableReason::SlotTaken))
        );
    }

    #[tokio::test]
    async fn compensation_code_discounts_once() {
        let (state, store) = TestConfig::default().to_state();
        let doctor = Uuid::new_v4();
        let patient = Uuid::new_v4();
        store.upsert_schedule(Schedule::weekdays(doctor)).await.unwrap();

        let source = Fixtures::appointment(
            5,
            patient,
            doctor,
            at(8, 0) - Duration::days(14),
            AppointmentStatus::Cancelled,
        );
        let code = CompensationService::new(&state)
            .issue_for(&source, now())
            .await
            .unwrap();

        let service = AppointmentBookingService::new(&state);
        let booked = service
            .book(patient, request(doctor, at(9, 0), Some(&code.code)), now())
            .await
            .unwrap();
        assert_eq!(booked.fee, 160_000);
        assert_eq!(booked.compensation_code_id, Some(code.id));

        let stored = store.find_compensation_code(&code.code).await.unwrap().unwrap();
        assert!(stored.is_used);
        assert_eq!(stored.used_appointment_id, Some(booked.id));

        assert_matches!(
            service
                .book(patient, request(doctor, at(9, 30), Some(&code.code)), now())
                .await,
            Err(AppointmentError::InvalidCompensationCode(_))
        );
    }

    #[tokio::test]
    async fn unknown_appointment_is_not_found() {
        let (state, _store) = TestConfig::default().to_state();
        let service = AppointmentBookingService::new(&state);
        assert_matches!(service.get_appointment(404).await, Err(AppointmentError::NotFound));
    }
}
